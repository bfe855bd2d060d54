//! Cash Application Engine CLI
//!
//! Start, inspect, and cancel workflow runs; serve the HTTP control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use cashapp_engine::api::rest::RestApiServer;
use cashapp_engine::config::AppConfig;
use cashapp_engine::observability::{logging, MetricsCollector};
use cashapp_engine::orchestrator::Orchestrator;
use cashapp_engine::workflow::history::{HistoryStore, RunId, SledHistoryStore};
use cashapp_engine::workflows::collaborators::doubles::{InMemoryErp, InMemoryManualReview, InMemoryNotify, InMemoryOcr};
use cashapp_engine::workflows::{CashApplicationWorkflow, CollectionsWorkflow, CreditReviewWorkflow};

#[derive(Parser)]
#[command(name = "cashapp-enginectl")]
#[command(about = "Durable cash-application workflow engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// History store path.
    #[arg(long, default_value = "./cashapp_history_db")]
    history_store: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a workflow run.
    Start {
        /// Workflow name: cash_application, collections, credit_review.
        workflow: String,
        /// JSON payload.
        #[arg(short, long)]
        payload: String,
        #[arg(long, default_value = "cli")]
        client_id: String,
    },

    /// Get a run's status.
    Status {
        run_id: String,
    },

    /// Request cancellation of a run.
    Cancel {
        run_id: String,
    },

    /// Print aggregate stats.
    Stats,

    /// Start the HTTP control surface.
    Serve {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = AppConfig::load_from_env()?;
    logging::init(&config.logging)?;

    let cli = Cli::parse();

    let history: Arc<dyn HistoryStore> = Arc::new(SledHistoryStore::open(&cli.history_store)?);
    let metrics = Arc::new(MetricsCollector::default());

    let ocr = Arc::new(InMemoryOcr::default());
    let erp = Arc::new(InMemoryErp::default());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());

    let definitions: Vec<Arc<dyn cashapp_engine::workflow::engine::WorkflowDefinition>> = vec![
        Arc::new(CashApplicationWorkflow {
            ocr,
            erp: erp.clone(),
            notify: notify.clone(),
            manual_review,
            resolver: Arc::new(cashapp_engine::matcher::AliasResolver::new()),
            rules: cashapp_engine::matcher::default_rules(),
            matcher_config: config.matcher.clone(),
            customers_by_id: Arc::new(Default::default()),
        }),
        Arc::new(CollectionsWorkflow { notify }),
        Arc::new(CreditReviewWorkflow { erp }),
    ];

    let orchestrator = Arc::new(Orchestrator::new(config, definitions, history, metrics));

    match cli.command {
        Commands::Start { workflow, payload, client_id } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let outcome = orchestrator.start(&workflow, payload, &client_id);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Status { run_id } => {
            let outcome = orchestrator.status(&RunId(run_id));
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Cancel { run_id } => {
            let outcome = orchestrator.cancel(&RunId(run_id));
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&orchestrator.stats())?);
        }

        Commands::Serve { port, host } => {
            let _workers = orchestrator.spawn_worker_pool();
            let app = RestApiServer::new(orchestrator).router();
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            println!("listening on http://{addr}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
