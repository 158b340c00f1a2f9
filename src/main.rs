use clap::Parser;
use quayside::config::Config;
use quayside::http::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quayside", about = "Self-hosted container image registry")]
struct Args {
    /// Path to the JSON configuration file. Created with defaults on first run.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load_or_init(&args.config)
        .await
        .expect("failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            config.log.console_level.as_tracing_directive(),
        ))
        .init();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let tls_files = config
        .server
        .is_tls()
        .then(|| (config.server.tls_crt_file.clone().unwrap(), config.server.tls_key_file.clone().unwrap()));

    let state = AppState::new(config);
    let app = build_router(state);

    match tls_files {
        Some((crt, key)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(crt, key).await?;
            tracing::info!(%addr, "listening (tls)");
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(%addr, "listening");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
