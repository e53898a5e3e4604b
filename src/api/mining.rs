use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, warn};

use super::models::{
    AppState, ErrorResponse, MiningStatusResponse, StartMiningRequest, StartMiningResponse,
    StopMiningResponse,
};
use crate::blockchain::Block;
use crate::error::MiningError;
use crate::mining::SubmitOutcome;

fn error_response(e: &MiningError) -> HttpResponse {
    let body = ErrorResponse {
        error: e.to_string(),
    };
    match e {
        MiningError::AlreadyRunning | MiningError::NotRunning => HttpResponse::Conflict().json(body),
        MiningError::InvalidMinerAddress | MiningError::Ledger(_) => {
            HttpResponse::BadRequest().json(body)
        }
        MiningError::RemoteLedgerFailure(_) => HttpResponse::BadGateway().json(body),
        MiningError::WorkerSpawnFailure(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Start mining for `miner_address`. Spawning and joining threads happens on
/// the blocking pool, never on an actix worker.
#[post("/mining/start/")]
pub async fn start_mining(
    state: web::Data<AppState>,
    req: web::Json<StartMiningRequest>,
) -> impl Responder {
    let miner_address = req.into_inner().miner_address.trim().to_string();
    let coordinator = state.coordinator.clone();
    let addr = miner_address.clone();

    match web::block(move || coordinator.start(&addr)).await {
        Ok(Ok(session_id)) => HttpResponse::Ok().json(StartMiningResponse {
            session_id,
            miner_address,
            workers: state.coordinator.stats().active_workers,
        }),
        Ok(Err(e)) => error_response(&e),
        Err(e) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: e.to_string(),
        }),
    }
}

#[post("/mining/stop/")]
pub async fn stop_mining(state: web::Data<AppState>) -> impl Responder {
    let coordinator = state.coordinator.clone();
    match web::block(move || coordinator.try_stop()).await {
        Ok(Ok(())) => HttpResponse::Ok().json(StopMiningResponse { stopped: true }),
        Ok(Err(e)) => error_response(&e),
        Err(e) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: e.to_string(),
        }),
    }
}

#[get("/mining/stats/")]
pub async fn mining_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(MiningStatusResponse {
        state: state.coordinator.state(),
        active_miners: state.coordinator.registry().len(),
        stats: state.coordinator.stats(),
    })
}

/// Head summary for remote miners building their next candidate.
#[get("/mining/tip/")]
pub async fn mining_tip(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.tip())
}

/// Accept a sealed candidate from a remote miner.
#[post("/mining/submit/")]
pub async fn submit_block(state: web::Data<AppState>, body: web::Json<Block>) -> impl Responder {
    let candidate = body.into_inner();
    let index = candidate.index;

    match state.ledger.append(candidate) {
        Ok(block) => {
            debug!("MINER - accepted remote block #{} from {}", block.index, block.miner_address);
            HttpResponse::Ok().json(SubmitOutcome {
                accepted: true,
                block: Some(block),
                reason: None,
            })
        }
        Err(e) => {
            warn!("MINER - rejected remote block #{index}: {e}");
            HttpResponse::Conflict().json(SubmitOutcome {
                accepted: false,
                block: None,
                reason: Some(e.to_string()),
            })
        }
    }
}
