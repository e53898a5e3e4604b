use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};
use crate::blockchain::to_numi;

#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    let balance = state.ledger.balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address,
        balance,
        balance_numi: to_numi(balance),
    })
}
