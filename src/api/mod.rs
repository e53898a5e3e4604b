mod balance;
mod chain;
mod health;
mod mining;
pub mod models;
mod stats;
mod wallet;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::get_difficulty)
            .service(balance::get_balance)
            .service(stats::get_stats)
            .service(mining::start_mining)
            .service(mining::stop_mining)
            .service(mining::mining_stats)
            .service(mining::mining_tip)
            .service(mining::submit_block)
            .service(wallet::create_wallet),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::blockchain::ledger::tests::{mine_next, store};
    use crate::blockchain::{Block, ChainTip, LedgerStore};
    use crate::mining::{
        LocalSubmitter, MinerRegistry, MiningConfig, MiningCoordinator, SubmitOutcome,
    };
    use crate::wallet::MinerIdentity;

    fn state(initial_difficulty: u32) -> web::Data<AppState> {
        let ledger = Arc::new(store(initial_difficulty));
        let coordinator = Arc::new(MiningCoordinator::new(
            MiningConfig {
                workers: 2,
                stats_interval: Duration::from_millis(100),
                watchdog: None,
            },
            ledger.hasher(),
            Arc::new(LocalSubmitter::new(Arc::clone(&ledger))),
            Arc::new(MinerRegistry::new()),
        ));
        web::Data::new(AppState::new(ledger, coordinator))
    }

    fn ledger_of(data: &web::Data<AppState>) -> Arc<LedgerStore> {
        Arc::clone(&data.ledger)
    }

    #[actix_web::test]
    async fn health_and_chain() {
        let app = test::init_service(App::new().app_data(state(1)).configure(init_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/v1/chain/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["length"], 1);
        assert_eq!(body["chain"][0]["index"], 0);

        let req = test::TestRequest::get().uri("/api/v1/validate/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], true);
    }

    #[actix_web::test]
    async fn submit_tip_balance_and_stats() {
        let data = state(1);
        let ledger = ledger_of(&data);
        let app = test::init_service(App::new().app_data(data).configure(init_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/mining/tip/").to_request();
        let tip: ChainTip = test::call_and_read_body_json(&app, req).await;
        assert_eq!(tip.index, 0);

        let block = mine_next(&ledger, "alice", None);
        let req = test::TestRequest::post()
            .uri("/api/v1/mining/submit/")
            .set_json(&block)
            .to_request();
        let outcome: SubmitOutcome = test::call_and_read_body_json(&app, req).await;
        assert!(outcome.accepted);
        assert_eq!(outcome.block.map(|b| b.index), Some(1));

        // Same block again loses the race.
        let req = test::TestRequest::post()
            .uri("/api/v1/mining/submit/")
            .set_json(&block)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let outcome: SubmitOutcome = test::read_body_json(resp).await;
        assert!(!outcome.accepted);
        assert!(outcome.reason.unwrap_or_default().contains("linkage"));

        let req = test::TestRequest::get().uri("/api/v1/balance/alice/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["balance"], 50);

        let req = test::TestRequest::get().uri("/api/v1/stats/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_blocks"], 2);
        assert_eq!(body["total_supply"], 50);
        assert_eq!(body["active_miners"], 0);

        let req = test::TestRequest::get().uri("/api/v1/difficulty/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["difficulty"], 1);
        assert_eq!(body["max_difficulty"], 6);
    }

    #[actix_web::test]
    async fn start_and_stop_mining() {
        let data = state(1);
        let ledger = ledger_of(&data);
        let app = test::init_service(App::new().app_data(data).configure(init_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/mining/start/")
            .set_json(json!({ "minerAddress": "" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/mining/start/")
            .set_json(json!({ "miner_address": "alice" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["workers"], 2);

        let req = test::TestRequest::post()
            .uri("/api/v1/mining/start/")
            .set_json(json!({ "miner_address": "bob" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/v1/mining/stats/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "running");
        assert_eq!(body["active_miners"], 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ledger.len() < 2 {
            assert!(std::time::Instant::now() < deadline, "no block mined");
            actix_rt::time::sleep(Duration::from_millis(20)).await;
        }

        let req = test::TestRequest::post().uri("/api/v1/mining/stop/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::post().uri("/api/v1/mining/stop/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/v1/mining/stats/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["stats"]["is_mining"], false);

        let chain: Vec<Block> = ledger.chain();
        assert!(chain.iter().skip(1).all(|b| b.miner_address == "alice"));
    }

    #[actix_web::test]
    async fn new_wallet_is_a_usable_identity() {
        let app = test::init_service(App::new().app_data(state(1)).configure(init_routes)).await;
        let req = test::TestRequest::post().uri("/api/v1/wallet/new/").to_request();
        let id: MinerIdentity = test::call_and_read_body_json(&app, req).await;
        assert!(id.address.starts_with("0x"));
    }
}
