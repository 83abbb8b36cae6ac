//! Brew Orders - live order board for a branch terminal
//!
//! Polls the order list and logs it whenever the visible page changes.
//! Usage: `brew-orders [search terms...]`

use anyhow::Result;
use brew_orders::gateway::StaticToken;
use brew_orders::sync::IntervalScheduler;
use brew_orders::{Config, HttpOrderGateway, OrderSynchronizer};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let gateway = HttpOrderGateway::new(&config.gateway_config(), Arc::new(StaticToken(config.api_token.clone())))?;
    let sync = OrderSynchronizer::new(gateway, Arc::new(IntervalScheduler), config.sync_config());

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !query.is_empty() { sync.search(query).await; }

    let mut changes = sync.subscribe();
    let focus = sync.focus();
    tracing::info!("☕ watching orders at {} every {:?}", config.api_url, config.poll_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() { break; }
                let (page, pages, orders, counts) = sync.read(|c| (c.current_page(), c.total_pages(), c.visible().clone(), c.status_counts())).await;
                tracing::info!(page, pages, ?counts, "order board updated");
                for order in orders.iter() {
                    tracing::info!(id = %order.id, customer = %order.customer_name, status = %order.status(), total = %order.total_amount, "order");
                }
            }
        }
    }

    focus.release();
    tracing::info!("order board stopped");
    Ok(())
}
