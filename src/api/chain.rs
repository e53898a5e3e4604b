use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, ChainResponse, DifficultyResponse, ValidateResponse};

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.ledger.chain();
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        difficulty: state.ledger.difficulty(),
        chain,
    })
}

/// Re-check every block's proof and linkage.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse {
        valid: state.ledger.is_valid_chain(),
        length: state.ledger.len(),
        difficulty: state.ledger.difficulty(),
    })
}

/// Current difficulty and the retarget parameters behind it.
#[get("/difficulty/")]
pub async fn get_difficulty(state: web::Data<AppState>) -> impl Responder {
    let controller = state.ledger.controller();
    let (min_difficulty, max_difficulty) = controller.bounds();
    let (last_interval_secs, avg_interval_secs) = state.ledger.recent_intervals();

    HttpResponse::Ok().json(DifficultyResponse {
        difficulty: state.ledger.difficulty(),
        min_difficulty,
        max_difficulty,
        target_block_time_secs: controller.target_block_time_secs(),
        adjust_window: controller.window(),
        adjust_threshold_pct: controller.threshold_pct(),
        last_interval_secs,
        avg_interval_secs,
    })
}
