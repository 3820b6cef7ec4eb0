//! Process roles.
//!
//! Each role owns its connection manager and closes it on the way out. A
//! role returns an error only for conditions that should end the process
//! with a non-zero status: the bus could not be reached within the retry
//! budget, or a store client could not be built.

use std::sync::Arc;

use anyhow::Context;
use auditoria_core::{
    BusConnectionManager, ConsumerLoop, Publisher,
    bus::{BusConnector, MemoryBus},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{
    app_state::AppState,
    config::{BusBackend, Config},
    wiring::{self, BusClient},
};
use crate::routes;

/// Cancels `token` on ctrl-c.
pub fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(err) => {
                warn!(error = %err, "failed to listen for ctrl-c; shutting down")
            }
        }
        token.cancel();
    });
}

pub async fn run_gateway(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let connector = wiring::bus_connector(&config.bus, BusClient::Gateway, None)?;
    serve_gateway(config, connector, shutdown).await
}

pub async fn run_worker(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let connector = wiring::bus_connector(&config.bus, BusClient::Worker, None)?;
    consume(config, connector, shutdown).await
}

/// Gateway and worker in one process over a shared in-memory bus.
///
/// Whichever role finishes first stops the other, so a worker that dies
/// takes the gateway down with it instead of leaving it publishing to a
/// topic nobody reads.
pub async fn run_standalone(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut bus_config = config.bus.clone();
    bus_config.backend = BusBackend::Memory;
    let memory = MemoryBus::new();

    let gateway_connector =
        wiring::bus_connector(&bus_config, BusClient::Gateway, Some(&memory))?;
    let worker_connector =
        wiring::bus_connector(&bus_config, BusClient::Worker, Some(&memory))?;

    let gateway_shutdown = shutdown.child_token();
    let worker_shutdown = shutdown.child_token();
    let mut worker = {
        let config = config.clone();
        let token = worker_shutdown.clone();
        tokio::spawn(async move { consume(&config, worker_connector, token).await })
    };

    let gateway =
        serve_gateway(config, gateway_connector, gateway_shutdown.clone());
    tokio::pin!(gateway);

    tokio::select! {
        gateway_result = &mut gateway => {
            worker_shutdown.cancel();
            let worker_result = worker.await.context("worker task panicked")?;
            gateway_result.and(worker_result)
        }
        joined = &mut worker => {
            let worker_result = joined.context("worker task panicked")?;
            if let Err(err) = &worker_result {
                error!(error = %err, "audit worker stopped; shutting down the gateway");
            }
            gateway_shutdown.cancel();
            let gateway_result = gateway.await;
            worker_result.and(gateway_result)
        }
    }
}

async fn serve_gateway(
    config: &Config,
    connector: Arc<dyn BusConnector>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bus = Arc::new(BusConnectionManager::new(
        connector,
        config.bus.retry.clone(),
    ));
    bus.connect_producer()
        .await
        .context("gateway could not connect to the event bus")?;

    let publisher = Publisher::new(Arc::clone(&bus), config.bus.topic.clone());
    let router = routes::create_app(AppState::new(publisher));

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, topic = %config.bus.topic, "audit gateway listening");

    let fatal = bus.fatal();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = fatal.cancelled() => {
                    error!("event bus producer lost; stopping gateway");
                }
            }
        })
        .await
        .context("gateway server error")?;

    bus.close();
    if bus.fatal().is_cancelled() {
        anyhow::bail!(
            "event bus connection lost and not re-established within {} attempts",
            bus.policy().max_attempts
        );
    }
    info!("audit gateway stopped");
    Ok(())
}

async fn consume(
    config: &Config,
    connector: Arc<dyn BusConnector>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let coordinator = wiring::persistence_coordinator(config).await?;
    let bus = Arc::new(BusConnectionManager::new(
        connector,
        config.bus.retry.clone(),
    ));
    let consumer = ConsumerLoop::new(
        Arc::clone(&bus),
        coordinator,
        config.bus.topic.clone(),
        config.bus.from_earliest,
    );

    let outcome = consumer.run(shutdown).await;
    bus.close();
    outcome.context("audit worker could not reach the event bus")
}
