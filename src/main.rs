//! DisasterZone - proximity alerting for community disaster reports.
//!
//! # API Endpoints
//!
//! - `POST /incidents` - Publish a report and alert users within range
//! - `GET /incidents` - Feed of incidents that have not expired
//! - `GET /incidents/:id` - One incident
//! - `POST /incidents/:id/end` - Mark a disaster as ended
//! - `GET /incidents/:id/share` - Share code for QR rendering
//! - `GET /share/:code` - Resolve a scanned share code
//! - `GET|POST /incidents/:id/comments` - Comments
//! - `POST /incidents/:id/likes` - Toggle a like
//! - `PUT /users/:user_id/presence` - Update last-known location
//! - `GET /users/:user_id/alerts` - Proximity alerts received
//! - `GET /users/:user_id/notifications` - Likes and comments received
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use disasterzone::api::AppState;
use disasterzone::config::Config;
use disasterzone::storage::Storage;
use disasterzone::worker::{run_expiry_sweep, run_proximity_rescan};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("disasterzone=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        db_url = %config.database_url,
        alert_radius_meters = config.alert_radius_meters,
        "Starting DisasterZone server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(run_expiry_sweep(
        storage.clone(),
        config.sweep_interval,
        config.dedup_ttl,
        cancel.clone(),
    ));
    let rescan_handle = tokio::spawn(run_proximity_rescan(
        storage.clone(),
        config.rescan_interval,
        config.alert_radius_meters,
        cancel.clone(),
    ));

    let state = AppState {
        storage,
        alert_radius_meters: config.alert_radius_meters,
    };
    let app = disasterzone::router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "DisasterZone is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background jobs");
    cancel.cancel();
    let (sweep, rescan) = tokio::join!(sweep_handle, rescan_handle);
    for (job, result) in [("expiry_sweep", sweep), ("proximity_rescan", rescan)] {
        if let Err(e) = result {
            tracing::error!(job, error = %e, "Background job terminated abnormally");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
