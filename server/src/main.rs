use std::{process::exit, sync::Arc};

use actix::{Actor, Addr};
use actix_web::{web, web::Path, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use clap::Parser;
use hashpool_server::{
    config::{Args, ServerConfig, UPSTREAM_TIMEOUT},
    dispatch::DispatchCoordinator,
    manager::ManagerActor,
    restful::RESTful,
    routes,
    scheduler::{RoundRunner, Scheduler},
    transport::SessionTransport,
    upstream::{self, HttpSubmission, HttpWorkSource},
    worker::WorkerActor,
};
use shared::{types::WorkerId, VERSION};
use tracing::*;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    shared::log::init_log("hashpool_server=info");

    info!("VERSION:{}", VERSION);

    let config = match ServerConfig::load(Args::parse()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            exit(1);
        }
    };
    info!("config: {config:?}");

    let client = reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
    upstream::probe(&client, "work", &config.work_url).await;
    upstream::probe(&client, "submit", &config.submit_url).await;

    let manager = ManagerActor::new().start();

    let coordinator =
        DispatchCoordinator::new(SessionTransport::new(manager.clone()), config.round_timeout)
            .with_work_time(config.work_time);
    let runner = RoundRunner::new(
        Arc::new(HttpWorkSource::new(client.clone(), config.work_url.clone())),
        Arc::new(HttpSubmission::new(client, config.submit_url.clone())),
        Arc::new(manager.clone()),
        coordinator,
    );
    Scheduler::new(runner, config.poll_interval).start();

    let restful = Arc::new(RESTful { manager: manager.clone() });

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(restful.clone()))
            .app_data(web::Data::new(manager.clone()))
            .route("/worker/{version}/{worker_id}", web::get().to(worker_endpoint))
            .service(routes::workers)
            .service(routes::round)
    })
    .workers(4)
    .bind(("0.0.0.0", config.port))?
    .run()
    .await?;

    Ok(())
}

async fn worker_endpoint(
    req: HttpRequest,
    stream: web::Payload,
    path: Path<(String, String)>,
    srv: web::Data<Addr<ManagerActor>>,
) -> Result<HttpResponse, Error> {
    let (version, worker_id) = path.into_inner();
    if version.ne(VERSION) {
        Ok(HttpResponse::Forbidden().body("version mismatch"))
    } else if worker_id.is_empty() {
        Ok(HttpResponse::BadRequest().body("empty worker id"))
    } else {
        ws::start(WorkerActor::new(srv.get_ref().clone(), WorkerId(worker_id)), &req, stream)
    }
}
