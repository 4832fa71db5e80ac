use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use murmur_api::notify::{LogMailer, MailQueue};
use murmur_api::password::Argon2Hashing;
use murmur_db::Database;
use murmur_server::config::Config;
use murmur_server::{build_state, reconcile, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);

    let cancel = CancellationToken::new();

    let (mail_queue, mail_worker) =
        MailQueue::start(LogMailer, config.public_url.clone(), cancel.clone());
    let state = build_state(db, &config, Arc::new(mail_queue), Arc::new(Argon2Hashing));

    let reconciler = tokio::spawn(reconcile::run_reconcile_loop(
        state.conversations.clone(),
        config.reconcile_interval,
        cancel.clone(),
    ));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Murmur server listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    for (name, task) in [("mail worker", mail_worker), ("reconciler", reconciler)] {
        if let Err(e) = task.await {
            error!("{} did not stop cleanly: {}", name, e);
        }
    }

    info!("Murmur server stopped");
    Ok(())
}
