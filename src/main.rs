use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use domain_sync::{
  logging, Config, DomainRecord, DomainsService, Page, PageRequest, QuerySnapshot, QueryStatus,
  Severity,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "domain-sync")]
#[command(about = "Browse and manage the domain inventory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/domain-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Service base URL (overrides config and DOMAIN_SYNC_API_URL)
  #[arg(long)]
  api_url: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show one page of domains
  List {
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    /// Domains per page (default: page_size from config)
    #[arg(short, long)]
    limit: Option<u32>,
  },
  /// Add a domain to the inventory
  Add { domain: String },
  /// Re-resolve every stored domain
  Refresh,
  /// Print a page every time it changes, until Ctrl-C
  Watch {
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    #[arg(short, long)]
    limit: Option<u32>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_file.as_deref())?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.api_url {
    config.api_url = Some(url);
  }
  info!(api_url = %config.api_url(), "using domain service");

  let service = DomainsService::from_config(&config).map_err(|e| eyre!(e.message().to_string()))?;

  match args.command {
    Command::List { page, limit } => {
      let limit = limit.unwrap_or(service.page_size());
      let mut query = service.use_domains_page(page, limit).map_err(|e| eyre!(e.to_string()))?;
      let snapshot = query.settled().await;
      match (snapshot.data(), &snapshot.error) {
        (_, Some(err)) => return Err(eyre!(err.message().to_string())),
        (Some(data), None) => print_page(query.request(), data),
        (None, None) => println!("No data"),
      }
    }
    Command::Add { domain } => {
      let result = service.add_domain(&domain).await;
      print_toasts(&service);
      let record = result.map_err(|e| eyre!(e.message().to_string()))?;
      print_record(&record);
    }
    Command::Refresh => {
      let result = service.trigger_refresh().await;
      print_toasts(&service);
      result.map_err(|e| eyre!(e.message().to_string()))?;
    }
    Command::Watch { page, limit } => {
      let limit = limit.unwrap_or(service.page_size());
      let mut query = service.use_domains_page(page, limit).map_err(|e| eyre!(e.to_string()))?;
      let request = query.request();
      print_snapshot(&service, request, &query.snapshot());

      loop {
        tokio::select! {
          changed = query.changed() => match changed {
            Some(snapshot) => print_snapshot(&service, request, &snapshot),
            None => break,
          },
          _ = tokio::signal::ctrl_c() => break,
        }
      }
    }
  }

  Ok(())
}

fn print_snapshot(service: &DomainsService, request: PageRequest, snapshot: &QuerySnapshot) {
  match snapshot.status {
    QueryStatus::Idle | QueryStatus::Stale => {}
    QueryStatus::Fetching => eprintln!("Loading page {}...", request.page()),
    QueryStatus::Fresh => {
      if let Some(data) = snapshot.data() {
        print_page(request, data);
      }
    }
    QueryStatus::Errored => {
      if let Some(message) = snapshot.error_message() {
        service.enqueue_toast(message, Severity::Error);
        eprintln!("[{}] {}", Severity::Error, message);
      }
    }
  }
}

fn print_page(request: PageRequest, data: &Page) {
  let pages = domain_sync::pagination::page_count(data.total, request.limit()).max(1);
  println!(
    "Page {} of {} ({} domains total)",
    request.page(),
    pages,
    data.total
  );
  println!(
    "{:<32} {:<16} {:<20} {:<28} {:<8} {:<8} {}",
    "DOMAIN", "IP", "LOCATION", "OWNER", "DNS", "ANYCAST", "ACTIVE"
  );
  for record in &data.items {
    let location = match (&record.geo_city, &record.geo_country) {
      (Some(city), Some(country)) if !city.is_empty() => format!("{}, {}", city, country),
      (_, Some(country)) => country.clone(),
      _ => "-".to_string(),
    };
    println!(
      "{:<32} {:<16} {:<20} {:<28} {:<8} {:<8} {}",
      record.domain_name,
      record.ip_address.as_deref().unwrap_or("-"),
      location,
      record.network_owner_name.as_deref().unwrap_or("-"),
      if record.has_resolution_data() { "yes" } else { "pending" },
      if record.is_anycast_node { "yes" } else { "no" },
      match record.is_active {
        Some(true) => "yes",
        Some(false) => "no",
        None => "?",
      }
    );
  }

  let mut hints = Vec::new();
  if let Some(prev) = request.prev() {
    hints.push(format!("previous: --page {}", prev.page()));
  }
  if request.has_next(data.total) {
    hints.push(format!("next: --page {}", request.next().page()));
  }
  if !hints.is_empty() {
    println!("({})", hints.join(", "));
  }
}

fn print_record(record: &DomainRecord) {
  match serde_json::to_string_pretty(record) {
    Ok(json) => println!("{}", json),
    Err(_) => println!("{}", record.domain_name),
  }
}

fn print_toasts(service: &DomainsService) {
  for toast in service.toasts().toasts().iter() {
    eprintln!("[{}] {}", toast.severity, toast.message);
  }
}
