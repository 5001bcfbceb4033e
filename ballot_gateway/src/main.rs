//! HTTP gateway exposing the ballot and token contracts.
//!
//! Configuration comes from the environment (see `GatewayConfig`); the shared
//! [`BallotGateway`] is built once and handed to every worker.

mod routes;

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tokenized_ballot::{init_logging, BallotGateway, GatewayConfig};
use tracing::{error, info, warn};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid gateway configuration");
            std::process::exit(1);
        }
    };
    let gateway = match BallotGateway::from_config(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            error!(%err, "failed to initialise gateway");
            std::process::exit(1);
        }
    };
    if config.ballot_address.is_none() || config.token_address.is_none() {
        warn!("contract addresses not fully configured; affected endpoints will fail");
    }
    info!(listen = %config.bind, write_mode = %config.write_mode, "ballot gateway starting");

    let data = web::Data::new(gateway);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::configure))
        .bind(config.bind.as_str())?
        .run()
        .await
}
