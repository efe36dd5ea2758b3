use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use regala_push_dispatch::config::Settings;
use regala_push_dispatch::delivery::FcmClient;
use regala_push_dispatch::notification::NotificationDispatcher;
use regala_push_dispatch::postgres::PostgresPool;
use regala_push_dispatch::server::{create_app, AppState};
use regala_push_dispatch::store::create_store_backends;
use regala_push_dispatch::telemetry::init_telemetry;
use regala_push_dispatch::triggers::QueueTriggerSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // Keep the guard alive until shutdown so pending spans are flushed
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // One delivery client per process, shared by every dispatcher invocation
    let delivery = Arc::new(FcmClient::new(&settings.fcm)?);

    let postgres_pool = if settings.store.backend == "postgres" {
        let pool = PostgresPool::new(&settings.database).await?;
        pool.migrate().await?;
        Some(Arc::new(pool))
    } else {
        None
    };

    let stores = create_store_backends(&settings.store, postgres_pool.clone());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        delivery,
        stores,
        &settings.dispatch,
    ));

    let state = AppState::new(settings.clone(), dispatcher.clone())
        .with_postgres(postgres_pool.clone());
    tracing::info!("Application state initialized");

    let subscriber = Arc::new(QueueTriggerSubscriber::new(
        settings.redis.clone(),
        dispatcher,
    ));
    let shutdown_signal = subscriber.shutdown_signal();

    let subscriber_task = subscriber.clone();
    let subscriber_handle = tokio::spawn(async move {
        if let Err(e) = subscriber_task.start().await {
            tracing::error!(error = %e, "Queue trigger subscriber failed");
        }
    });

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_signal))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = subscriber_handle.await;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
