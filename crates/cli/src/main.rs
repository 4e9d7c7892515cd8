//! SOP Monitor Entry Point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use sop_monitor_agent::{parse_transcript, record_stream, run_batch, run_live, ComplianceEngine, LiveOptions};
use sop_monitor_compliance::ComplianceReport;
use sop_monitor_config::{default_sop, load_settings, load_sop, Settings, SopRules};
use sop_monitor_core::{KnownCustomer, NoopAnnotator};

#[derive(Parser)]
#[command(author, version, about = "Score a customer-service conversation against an SOP", long_about = None)]
struct Cli {
    /// Transcript file (JSON array or JSON lines); `-` reads stdin in live mode
    #[arg(short, long)]
    transcript: PathBuf,

    /// SOP rule set (.toml, .json or .md outline); overrides `sop_file`
    #[arg(short, long)]
    sop: Option<PathBuf>,

    /// Known customer name for the greeting check
    #[arg(short, long)]
    customer_name: Option<String>,

    /// Configuration environment (loads config/<env>.*)
    #[arg(short, long)]
    env: Option<String>,

    /// Treat the transcript as a live JSON-lines stream
    #[arg(long)]
    live: bool,

    /// Print the report on a single line
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = load_settings(cli.env.as_deref())?;
    init_tracing(&settings);

    tracing::info!("Starting SOP Monitor v{}", env!("CARGO_PKG_VERSION"));

    let sop = resolve_sop(&cli, &settings)?;

    let mut builder = ComplianceEngine::builder(settings.engine.clone()).sop(sop);
    if let Some(name) = &cli.customer_name {
        builder = builder.customer(&KnownCustomer(name.clone()));
    }
    let engine = Arc::new(builder.build()?);

    let report = if cli.live {
        run_live_mode(&cli, &settings, Arc::clone(&engine)).await?
    } else {
        let content = tokio::fs::read_to_string(&cli.transcript).await?;
        let records = parse_transcript(&content)?;
        run_batch(&engine, records, &settings.engine.speaker_labels)
    };

    println!("{}", report.to_json(!cli.compact)?);

    if cli.live {
        // A blocked stdin read would keep the runtime from shutting down
        std::process::exit(0);
    }
    Ok(())
}

fn resolve_sop(cli: &Cli, settings: &Settings) -> Result<SopRules, Box<dyn std::error::Error>> {
    let path = cli
        .sop
        .clone()
        .or_else(|| settings.sop_file.as_ref().map(PathBuf::from));

    match path {
        Some(path) => Ok(load_sop(&path)?),
        None => {
            tracing::info!("No SOP file configured. Using built-in rule set.");
            Ok(default_sop())
        }
    }
}

async fn run_live_mode(
    cli: &Cli,
    settings: &Settings,
    engine: Arc<ComplianceEngine>,
) -> Result<ComplianceReport, Box<dyn std::error::Error>> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if cli.transcript.as_os_str() == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        Box::new(BufReader::new(tokio::fs::File::open(&cli.transcript).await?))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(?event, "Compliance event"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let options = LiveOptions {
        speaker_labels: settings.engine.speaker_labels.clone(),
        ..LiveOptions::default()
    };

    Ok(run_live(engine, record_stream(reader), Arc::new(NoopAnnotator), shutdown_rx, options).await)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, finalizing session...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, finalizing session...");
        }
    }
}

/// Initialize tracing on stderr; stdout carries the report
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("sop_monitor={}", level).into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
