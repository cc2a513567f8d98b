use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};
use shared::interaction::{RestfulError, RestfulResponse};
use tracing::trace;

use crate::restful::RESTful;

#[get("/api/v1/workers")]
pub async fn workers(api: web::Data<Arc<RESTful>>) -> Result<impl Responder, RestfulError> {
    trace!("/api/v1/workers");
    let workers = api.workers().await?;
    Ok(HttpResponse::Ok().json(RestfulResponse::success(workers)))
}

#[get("/api/v1/round")]
pub async fn round(api: web::Data<Arc<RESTful>>) -> Result<impl Responder, RestfulError> {
    trace!("/api/v1/round");
    let summary = api.last_round().await?;
    Ok(HttpResponse::Ok().json(RestfulResponse::success(summary)))
}
