use clap::Parser;
use gatelog::cli::{Args, build_config, init_logging, load_jwt_secrets, open_database};
use gatelog::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_jwt_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, access_secret, refresh_secret);

    init_cleanup(&config.db, config.audit.retention_days).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap();
    info!(address = %local_addr, audience = %config.audience, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
