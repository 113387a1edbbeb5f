use {
    paycore::{
        AppState,
        adapters::{Gateways, sandbox::SandboxGateway, stripe::StripeGateway},
        config::Config,
        domain::id::ProviderKey,
        infra::postgres::{self, PgStore},
        services::{registry::MethodRegistry, worker::run_reprocessor},
        transport::http::router,
    },
    sqlx::postgres::PgPoolOptions,
    std::{error::Error, sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await?;
    postgres::migrate(&pool).await?;

    let registry = MethodRegistry::from_json_file(&config.payment_methods_path)?;

    let mut gateways = Gateways::new();
    if let Some(stripe) = &config.stripe {
        gateways = gateways.with(Arc::new(StripeGateway::new(
            &stripe.secret_key,
            stripe.webhook_secret.clone(),
        )?));
    }
    if let Some(secret) = &config.sandbox_webhook_secret {
        gateways = gateways.with(Arc::new(SandboxGateway::new(
            ProviderKey::new("sandbox")?,
            secret.clone(),
        )));
    }
    let providers: Vec<String> = gateways.providers().map(|p| p.to_string()).collect();
    tracing::info!(?providers, methods = registry.len(), "gateways configured");

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(registry),
        gateways,
        config.gateway_timeout,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reprocessor = tokio::spawn(run_reprocessor(
        state.webhooks.clone(),
        config.reprocess_interval,
        shutdown_rx,
    ));

    let app = router(state, config.request_timeout);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    reprocessor.await.ok();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
