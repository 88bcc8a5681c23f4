use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{AllInterfaceStatus, InterfaceService};
use domain::event::EventPublisher;
use domain::StatusEvent;
use infrastructure::config::AgentConfig;
use infrastructure::messaging::{
    BroadcastEventPublisher, CompositeEventPublisher, LoggingEventPublisher,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Read every interface once and exit
    #[arg(long, conflicts_with = "continuous")]
    once: bool,

    /// Keep connections open and poll until Ctrl-C
    #[arg(long)]
    continuous: bool,

    /// Override the polling period
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print value changes to stdout as JSON lines
    #[arg(long)]
    json: bool,
}

/// Uses the crate's own config directory when started from the workspace root.
fn resolve_config_dir(requested: &str) -> String {
    let dev_dir = "crates/aid-agent/config";
    if requested == "config"
        && !std::path::Path::new(requested).exists()
        && std::path::Path::new(dev_dir).exists()
    {
        return dev_dir.to_string();
    }
    requested.to_string()
}

fn print_summary(status: &AllInterfaceStatus) {
    for iface in status.interfaces().iter() {
        let line = iface.log_line();
        info!(
            interface = %iface.display_name(),
            technology = %iface.technology(),
            changes = iface.value_changes(),
            "{:?}: {}", line.color, line.text
        );
        for item in iface.items().all() {
            info!(interface = %iface.display_name(), item = %item.display_name(), value = %item.value());
        }
    }
}

fn spawn_json_printer(bus: &BroadcastEventPublisher) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event @ StatusEvent::ItemValueChanged { .. }) => {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Cannot serialize event"),
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,aid_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("AID polling agent starting (pid {})", std::process::id());

    let config_dir = resolve_config_dir(&args.config_dir);
    info!(config_dir = %config_dir, "Loading configuration...");
    let mut config = AgentConfig::load(&config_dir)?;

    if let Some(ms) = args.interval_ms {
        config.poll_interval_ms = ms;
    }
    if args.continuous {
        config.continuous = true;
    }
    if args.once {
        config.continuous = false;
    }

    let status = Arc::new(AllInterfaceStatus::from_config(&config)?);
    info!(
        interfaces = status.interfaces().len(),
        max_concurrency = status.max_concurrency(),
        "Configuration loaded"
    );

    let bus = BroadcastEventPublisher::default();
    let printer = args.json.then(|| spawn_json_printer(&bus));
    let publisher: Arc<dyn EventPublisher> = Arc::new(CompositeEventPublisher::new(vec![
        Arc::new(LoggingEventPublisher),
        Arc::new(bus),
    ]));

    if !config.continuous {
        let changes = status.update_values_single_shot().await;
        if let Err(e) = publisher.publish_batch(status.drain_events()).await {
            error!(error = %e, "Failed to publish status events");
        }
        info!(changes, "Single-shot update finished");
        print_summary(&status);
        drop(publisher);
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        return Ok(());
    }

    status.start_continuous_run().await;
    let service = Arc::new(InterfaceService::new(
        status.clone(),
        publisher,
        config.poll_interval(),
    ));
    let cancel = CancellationToken::new();
    let service_handle = service.clone().spawn(cancel.clone());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
    }

    cancel.cancel();
    service_handle.await?;
    status.stop_continuous_run().await;
    print_summary(&status);
    if let Some(printer) = printer {
        printer.abort();
    }

    info!("Good bye!");
    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Cannot start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\nCRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}
