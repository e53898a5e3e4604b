use actix_web::{App, HttpServer, web};
use log::{debug, info};
use std::io;
use std::sync::Arc;

use numi_miner::api::{self, AppState};
use numi_miner::blockchain::LedgerStore;
use numi_miner::config::{Config, REMOTE_TIMEOUT};
use numi_miner::mining::{
    BlockSubmitter, LocalSubmitter, MinerRegistry, MiningCoordinator, RemoteSubmitter,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Reads .env first so RUST_LOG may come from there too.
    let config = Config::from_env();
    env_logger::init();
    let config = config.map_err(io::Error::other)?;

    let hasher = config.hash_algorithm.hasher();
    let ledger = Arc::new(LedgerStore::new(config.ledger(), Arc::clone(&hasher)));
    ledger.subscribe(|block| {
        debug!(
            "LEDGER - head is now #{} (difficulty {}, miner {})",
            block.index, block.difficulty, block.miner_address
        );
    });

    let submitter: Arc<dyn BlockSubmitter> = match &config.remote_ledger_url {
        Some(url) => Arc::new(RemoteSubmitter::new(url.as_str(), REMOTE_TIMEOUT)),
        None => Arc::new(LocalSubmitter::new(Arc::clone(&ledger))),
    };
    let coordinator = Arc::new(MiningCoordinator::new(
        config.mining(),
        hasher.clone(),
        submitter,
        Arc::new(MinerRegistry::new()),
    ));

    if let Some(miner_address) = &config.miner_address {
        let session = coordinator.start(miner_address).map_err(io::Error::other)?;
        info!("MINER - auto-started session {session} for {miner_address}");
    }

    let (host, port) = (config.host.clone(), config.port);
    println!(
        "⛓️ Starting NUMI miner API at http://{host}:{port} ({}, {} workers)",
        hasher.name(),
        config.mining().worker_count()
    );

    let state = web::Data::new(AppState::new(ledger, Arc::clone(&coordinator)));

    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await;

    coordinator.stop();
    served
}
