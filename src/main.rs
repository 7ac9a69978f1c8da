use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eco_anchor::anchor::{anchor_events, anchored_at_block, is_anchored, Fingerprint};
use eco_anchor::config::{ChainArgs, ServeArgs, StoreArgs};
use eco_anchor::error::{AnchorError, Result};
use eco_anchor::server::{self, AppState};
use eco_anchor::state::memory::MemoryReadingStore;
use eco_anchor::state::repository::PgReadingStore;
use eco_anchor::state::{Database, ReadingStore};
use eco_anchor::workflow::{open_chain, AnchorService};

#[derive(Parser)]
#[command(name = "eco-anchor")]
#[command(about = "Tamper-evident sensor readings anchored to an EVM ledger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with background anchoring
    Serve(ServeArgs),
    /// Print the canonical string and fingerprint of a reading
    Fingerprint {
        sensor_id: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Verify the latest stored reading of a sensor against the ledger
    Verify {
        sensor_id: String,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        chain: ChainArgs,
    },
    /// Ask the ledger directly whether a fingerprint is anchored
    Lookup {
        /// 0x-prefixed 32-byte fingerprint
        fingerprint: String,
        #[command(flatten)]
        chain: ChainArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eco_anchor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Fingerprint { sensor_id, value } => fingerprint(&sensor_id, value),
        Commands::Verify {
            sensor_id,
            store,
            chain,
        } => verify(&sensor_id, store, chain).await,
        Commands::Lookup { fingerprint, chain } => lookup(&fingerprint, chain).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error_kind = e.kind(), error = %e, "eco-anchor failed");
            ExitCode::FAILURE
        }
    }
}

async fn open_store(args: &StoreArgs) -> Result<Arc<dyn ReadingStore>> {
    if args.in_memory {
        warn!("Using in-memory store, readings are lost on exit");
        return Ok(Arc::new(MemoryReadingStore::new()));
    }
    let url = args
        .database_url
        .as_deref()
        .ok_or_else(|| AnchorError::Config("DATABASE_URL is not set".into()))?;
    let db = Database::connect(url).await?;
    db.migrate().await?;
    Ok(Arc::new(PgReadingStore::new(db)))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store = open_store(&args.store).await?;
    let shutdown = CancellationToken::new();

    let missing = args.chain.missing();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Blockchain settings missing");
    }
    let chain = open_chain(args.chain.into_chain_config(), &shutdown).await;

    let (service, worker) =
        AnchorService::start(store, chain, args.queue_capacity, shutdown.clone());

    let signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
    };

    server::serve(AppState { service }, &args.listen, signal).await?;

    if let Some(worker) = worker {
        match worker.await {
            Ok(stats) => info!(
                submitted = stats.submitted,
                failed = stats.failed,
                "Anchor worker finished"
            ),
            Err(e) => error!(error = %e, "Anchor worker panicked"),
        }
    }
    Ok(())
}

fn fingerprint(sensor_id: &str, value: f64) -> Result<()> {
    let canonical = eco_anchor::anchor::fingerprint::canonicalize(sensor_id, value)?;
    let fp = Fingerprint::derive(sensor_id, value)?;
    println!("{canonical}");
    println!("{fp}");
    Ok(())
}

async fn verify(sensor_id: &str, store: StoreArgs, chain: ChainArgs) -> Result<()> {
    let store = open_store(&store).await?;
    let cancel = CancellationToken::new();
    let chain = open_chain(chain.into_chain_config(), &cancel).await;
    let (service, _) = AnchorService::start(store, chain, 1, cancel.clone());

    let verdict = service.on_verify_requested(sensor_id).await?;
    let json = serde_json::to_string_pretty(&verdict)
        .map_err(|e| AnchorError::Config(format!("verdict serialization: {e}")))?;
    println!("{json}");
    cancel.cancel();
    Ok(())
}

async fn lookup(fingerprint: &str, chain: ChainArgs) -> Result<()> {
    let fp = Fingerprint::from_hex(fingerprint)?;
    let missing = chain.missing();
    let config = chain.into_chain_config().ok_or_else(|| {
        AnchorError::Config(format!("missing settings: {}", missing.join(", ")))
    })?;
    let cancel = CancellationToken::new();
    let ctx = eco_anchor::anchor::ChainContext::connect(&config, &cancel).await?;

    let anchored = is_anchored(&ctx, fp, &cancel).await?;
    let block = anchored_at_block(&ctx, fp, &cancel).await?;
    println!("fingerprint: {fp}");
    println!("anchored:    {anchored}");
    if let Some(block) = block {
        println!("block:       {block}");
    }
    for event in anchor_events(&ctx, fp, &cancel).await? {
        println!(
            "event:       sender {} block {} timestamp {}",
            event.sender, event.block_number, event.timestamp
        );
    }
    Ok(())
}
