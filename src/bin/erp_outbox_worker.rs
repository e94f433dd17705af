//! Standalone binary for the ERP outbox worker (C7), run as its own process/replica set so the
//! HTTP server and the push loop scale independently.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use procurement_orchestrator::circuit_breaker::CircuitBreaker;
use procurement_orchestrator::config::{self, ErpMode};
use procurement_orchestrator::db;
use procurement_orchestrator::erp::{
    csv::CsvErpGateway, http::HttpErpGateway, mock::MockErpGateway, ErpGateway,
};
use procurement_orchestrator::events::EventSender;
use procurement_orchestrator::workers::erp_outbox_worker::ErpOutboxWorker;

#[derive(Debug, Parser)]
#[command(name = "erp-outbox-worker", about = "Drains the ERP push outbox")]
struct Args {
    /// Run a single leased batch and exit instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Restrict this run to a single tenant. Omit to process every tenant.
    #[arg(long)]
    tenant_id: Option<String>,

    /// Max rows to lease per batch. Defaults to the configured worker batch size.
    #[arg(long)]
    limit: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = config::load_config()?;
    config::init_tracing(&config.log_level, config.log_json);

    info!("erp outbox worker starting");

    let db_pool = db::establish_connection_from_app_config(&config).await.map_err(|e| {
        error!("failed to connect to database: {}", e);
        e
    })?;
    db::run_migrations(&db_pool).await?;
    let db_pool = Arc::new(db_pool);

    let gateway: Arc<dyn ErpGateway> = match config.erp.mode {
        ErpMode::Mock => Arc::new(MockErpGateway::new()),
        ErpMode::SeniorCsv => Arc::new(CsvErpGateway::new(&config.erp)),
        ErpMode::SeniorHttp => Arc::new(HttpErpGateway::new(&config.erp)),
    };

    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

    let circuit = CircuitBreaker::new(config.erp_circuit.clone());
    let worker = ErpOutboxWorker::new(
        db_pool,
        gateway,
        circuit,
        config.erp_outbox.clone(),
        event_sender,
    );

    let limit = args.limit.unwrap_or(config.erp_outbox.worker_batch_size as u64);

    if args.once {
        let stats = worker.run_once(args.tenant_id.as_deref(), limit).await?;
        info!(?stats, "erp outbox worker: single batch complete");
    } else {
        worker.run_forever(args.tenant_id.as_deref()).await;
    }

    Ok(())
}
