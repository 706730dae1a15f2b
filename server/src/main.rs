#![allow(dead_code)]
mod classify;
mod db_core;
mod error;
mod events;
mod extract;
mod feedback;
mod mail;
mod model;
mod pipeline;
mod provider;
mod push;
mod rate_limiters;
mod request_tracing;
mod review;
mod routes;
mod scan;
mod server_config;
#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use std::{env, net::SocketAddr, sync::Arc};

use axum::{extract::FromRef, http::StatusCode, response::IntoResponse, Router};
use futures::future::join_all;
use mail::{GatewayMailClient, MailClient};
use mimalloc::MiMalloc;
use pipeline::EmailPipeline;
use provider::{ModelProvider, StructuredCompletion};
use push::PushHandler;
use rate_limiters::RateLimiters;
use routes::AppRouter;
use scan::ScanController;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::{signal, task::JoinHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
struct ServerState {
    http_client: HttpClient,
    conn: DatabaseConnection,
    rate_limiters: RateLimiters,
    pipeline: Arc<EmailPipeline>,
    scans: Arc<ScanController>,
    push: Arc<PushHandler>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_env("RUST_LOG"))
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = server_config::cfg
        .store
        .url
        .clone()
        .or_else(|| env::var("DATABASE_URL").ok())
        .expect("store.url or DATABASE_URL must be set");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let rate_limiters = RateLimiters::from_config();

    let mail_client: Arc<dyn MailClient> = Arc::new(GatewayMailClient::new(http_client.clone()));
    let model_provider: Arc<dyn StructuredCompletion> = Arc::new(ModelProvider::new(
        http_client.clone(),
        rate_limiters.clone(),
    ));

    let email_pipeline = Arc::new(EmailPipeline::new(
        conn.clone(),
        mail_client.clone(),
        model_provider.clone(),
    ));
    let scans = Arc::new(ScanController::new(
        conn.clone(),
        email_pipeline.clone(),
        mail_client.clone(),
    ));
    let push = Arc::new(PushHandler::new(
        conn.clone(),
        email_pipeline.clone(),
        mail_client.clone(),
    ));

    let state = ServerState {
        http_client,
        conn,
        rate_limiters,
        pipeline: email_pipeline,
        scans,
        push,
    };

    let router = AppRouter::create(state);

    let shutdown_handle = tokio::spawn(async move {
        if env::var("NO_SHUTDOWN").unwrap_or("false".to_string()) == "true" {
            return;
        }
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        tracing::info!("Received Ctrl+C, shutting down");
        std::process::exit(0);
    });

    join_all(vec![run_server(router), shutdown_handle]).await;

    Ok(())
}

fn run_server(router: Router) -> JoinHandle<()> {
    tokio::spawn(async {
        let port = env::var("PORT").unwrap_or("5006".to_string());
        tracing::info!("Mailsift running on http://0.0.0.0:{}", port);
        // check config
        println!("{}", *server_config::cfg);

        let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
        tracing::debug!("listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, router).await.unwrap();
    })
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
