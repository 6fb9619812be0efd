use backend::config::Config;
use backend::{app, AppState};

mod telemetry;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let state = match AppState::from_config(&config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to build application state");
            std::process::exit(1);
        }
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("bind");
    tracing::info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, app(state))
        .await
        .expect("server error");
}
