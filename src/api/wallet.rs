use actix_web::{HttpResponse, Responder, post};

use crate::wallet::generate_identity;

/// Mint a fresh miner identity. Nothing is stored server-side.
#[post("/wallet/new/")]
pub async fn create_wallet() -> impl Responder {
    HttpResponse::Ok().json(generate_identity())
}
