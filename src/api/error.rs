//! Error taxonomy for the domain-info transport.

use thiserror::Error;

/// Message shown in place of a malformed success body.
const DECODE_MESSAGE: &str = "Received an unexpected response from the server";

/// A transport failure, normalized so that a display-ready message is always
/// available.
///
/// Errors are `Clone` because a single failed fetch is stored on the cache
/// entry and handed to every subscriber of that entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// The request never completed (connection refused, DNS failure, timeout,
  /// body interrupted mid-read).
  #[error("{message}")]
  Network { message: String },

  /// The service answered with a non-2xx status.
  #[error("{message}")]
  Service { status: u16, message: String },

  /// A 2xx response whose body did not match the expected shape.
  ///
  /// `detail` carries the parser diagnostic for logs; it is never part of the
  /// displayed message.
  #[error("Received an unexpected response from the server")]
  Decode { detail: String },

  /// Rejected before any request was issued.
  #[error("{message}")]
  InvalidInput { message: String },
}

impl ApiError {
  pub fn network(err: impl std::fmt::Display) -> Self {
    Self::Network {
      message: format!("Network error: {}", err),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  /// Display-ready message for this error.
  pub fn message(&self) -> &str {
    match self {
      Self::Network { message }
      | Self::Service { message, .. }
      | Self::InvalidInput { message } => message.as_str(),
      Self::Decode { .. } => DECODE_MESSAGE,
    }
  }

  /// HTTP status, when the service produced one.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Service { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether an automatic retry might succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Network { .. } => true,
      Self::Service { status, .. } => *status >= 500 || *status == 429,
      Self::Decode { .. } | Self::InvalidInput { .. } => false,
    }
  }
}
