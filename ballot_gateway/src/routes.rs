//! HTTP routes over [`BallotGateway`].

use actix_web::{get, http::StatusCode, post, web, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokenized_ballot::primitives::parse_address;
use tokenized_ballot::{Address, BallotError, BallotGateway, CastVotesRequest, MintTokensRequest};

/// Shared gateway handle stored in app data.
pub type GatewayData = web::Data<Arc<BallotGateway>>;

/// Library error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub BallotError);

impl From<BallotError> for ApiError {
    fn from(err: BallotError) -> Self {
        Self(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            err if err.is_input_error() => StatusCode::BAD_REQUEST,
            BallotError::MissingConfig(_) | BallotError::Artifact(_) | BallotError::Signer(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.0.to_string() }))
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    result: T,
}

fn wrapped<T: Serialize>(result: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope { result })
}

fn path_address(raw: &str) -> Result<Address, ApiError> {
    parse_address(raw).map_err(ApiError)
}

#[get("/get_hello")]
async fn get_hello(gateway: GatewayData) -> HttpResponse {
    HttpResponse::Ok().json(gateway.hello())
}

#[get("/contract-address")]
async fn contract_address(gateway: GatewayData) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(gateway.contract_address()?))
}

#[get("/token-address")]
async fn token_address(gateway: GatewayData) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(gateway.token_address()?))
}

#[post("/cast_votes")]
async fn cast_votes(
    gateway: GatewayData,
    body: web::Json<CastVotesRequest>,
) -> Result<HttpResponse, ApiError> {
    Ok(wrapped(gateway.cast_votes(&body).await?))
}

#[get("/get_votes/{voter}")]
async fn get_votes(gateway: GatewayData, voter: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let voter = path_address(&voter)?;
    Ok(wrapped(gateway.get_votes(voter).await?))
}

#[post("/delegate_votes/{to}")]
async fn delegate_votes(gateway: GatewayData, to: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let to = path_address(&to)?;
    Ok(wrapped(gateway.delegate_votes(to).await?))
}

#[post("/mint-tokens")]
async fn mint_tokens(
    gateway: GatewayData,
    body: web::Json<MintTokensRequest>,
) -> Result<HttpResponse, ApiError> {
    Ok(wrapped(gateway.mint_tokens(&body).await?))
}

/// Register every route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_hello)
        .service(contract_address)
        .service(token_address)
        .service(cast_votes)
        .service(get_votes)
        .service(delegate_votes)
        .service(mint_tokens);
}
