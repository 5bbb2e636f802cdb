use anyhow::Context;
use classbook_api::{app, AppState};
use classbook_booking::{BookingStore, CancellationOrchestrator, CancellationPolicy, NotificationCenter};
use classbook_core::refund::SimulatedRefundProvider;
use classbook_core::remote::InMemoryClassApi;
use classbook_shared::ClassSummary;
use classbook_store::{Config, FileSnapshotRepository};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Listings served by the in-process class backend
fn demo_catalog() -> Vec<ClassSummary> {
    let class = |name: &str, provider: &str, location: &str, pence: i64, auto_confirm: bool| ClassSummary {
        id: Uuid::new_v4(),
        name: name.to_string(),
        provider_id: format!("provider-{}", provider.to_lowercase().replace(' ', "-")),
        provider_name: provider.to_string(),
        location: location.to_string(),
        price: Decimal::new(pence, 2),
        currency: "GBP".to_string(),
        auto_confirm,
    };

    vec![
        class("Junior Swimming", "Aqua Kids", "Leisure Centre", 1500, false),
        class("Toddler Gym", "Bounce", "Sports Hall", 950, true),
        class("Saturday Art Club", "Little Makers", "Community Centre", 1200, false),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classbook_api=debug,classbook_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Classbook API on port {}", config.server.port);

    let policy = CancellationPolicy::new(
        config.business_rules.refund_window_hours,
        config.business_rules.service_fee,
    );
    let refunds = Arc::new(SimulatedRefundProvider::new(Duration::from_millis(
        config.refund.simulated_delay_ms,
    )));
    let class_api = Arc::new(InMemoryClassApi::new(demo_catalog()));

    let mut orchestrator = CancellationOrchestrator::new(
        Arc::new(BookingStore::new()),
        refunds,
        class_api,
        Arc::new(NotificationCenter::new()),
    )
    .with_policy(policy);

    if config.snapshot.enabled {
        tracing::info!("Booking snapshot at {}", config.snapshot.path);
        orchestrator = orchestrator.with_snapshot(Arc::new(FileSnapshotRepository::new(&config.snapshot.path)));
    }

    let restored = orchestrator
        .restore_snapshot()
        .await
        .context("Failed to restore booking snapshot")?;
    if restored > 0 {
        tracing::info!("Restored {} bookings", restored);
    }
    if let Err(e) = orchestrator.refresh_catalog().await {
        tracing::warn!("Starting without a class catalog: {}", e);
    }

    let app = app(AppState::new(Arc::new(orchestrator)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
