use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let active_miners = state.coordinator.registry().len();
    HttpResponse::Ok().json(state.ledger.stats(active_miners))
}
