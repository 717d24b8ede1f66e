mod demo;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hivemind_core::config::SchedulerConfig;
use hivemind_core::ledger::ResourceLedger;
use hivemind_core::scheduler::SchedulerContext;
use hivemind_core::world::snapshot::UnitCategory;

use crate::demo::SyntheticWorld;

/// A production subsystem that periodically buys one unit
struct ProductionPlan {
    owner: &'static str,
    minerals: u32,
    gas: u32,
    unit: UnitCategory,
    cadence: Duration,
}

/// Sent to the tick loop once a reservation is ready to be spent
struct PurchaseOrder {
    owner: String,
    minerals: u32,
    gas: u32,
    unit: UnitCategory,
}

static PLANS: [ProductionPlan; 3] = [
    ProductionPlan {
        owner: "barracks",
        minerals: 150,
        gas: 0,
        unit: UnitCategory::Infantry,
        cadence: Duration::from_millis(1500),
    },
    ProductionPlan {
        owner: "factory",
        minerals: 150,
        gas: 100,
        unit: UnitCategory::Armored,
        cadence: Duration::from_millis(4000),
    },
    ProductionPlan {
        owner: "starport",
        minerals: 100,
        gas: 100,
        unit: UnitCategory::Air,
        cadence: Duration::from_millis(6000),
    },
];

/// Worker walk to the build site before the money is actually spent
const BUILD_TRAVEL: Duration = Duration::from_millis(400);

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

async fn run_producer(
    plan: &'static ProductionPlan,
    ledger: Arc<ResourceLedger>,
    orders: mpsc::Sender<PurchaseOrder>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(plan.cadence);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(guard) = ledger.try_reserve_guard(plan.minerals, plan.gas, plan.owner) else {
            debug!("{} waiting for {}m/{}g", plan.owner, plan.minerals, plan.gas);
            continue;
        };

        // Dropping the guard on shutdown hands the money back
        tokio::select! {
            _ = sleep(BUILD_TRAVEL) => {}
            _ = shutdown.changed() => break,
        }

        let order = PurchaseOrder {
            owner: guard.keep(),
            minerals: plan.minerals,
            gas: plan.gas,
            unit: plan.unit,
        };
        if orders.send(order).await.is_err() {
            break;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Hivemind decision core v{}", env!("CARGO_PKG_VERSION"));

    let config = SchedulerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} Hz, throttle every {} ticks, priority table v{}",
        config.tick_rate, config.throttle_interval, config.priorities.version
    );

    let demo_ticks: u64 = env_or("DEMO_TICKS", 660);
    let seed: u64 = env_or("DEMO_SEED", 7);

    let mut context = SchedulerContext::new(&config);
    let ledger = context.ledger();
    let metrics = context.metrics();
    let mut world = SyntheticWorld::new(seed);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (orders_tx, mut orders_rx) = mpsc::channel::<PurchaseOrder>(16);

    let mut producers = Vec::with_capacity(PLANS.len());
    for plan in &PLANS {
        producers.push(tokio::spawn(run_producer(
            plan,
            Arc::clone(&ledger),
            orders_tx.clone(),
            shutdown_rx.clone(),
        )));
    }
    drop(orders_tx);

    let report_every = u64::from(config.tick_rate) * 5;
    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(config.tick_rate)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let run = async {
        for _ in 0..demo_ticks {
            ticker.tick().await;

            while let Ok(order) = orders_rx.try_recv() {
                if world.spend(order.minerals, order.gas) {
                    let tag = world.spawn_friendly(order.unit);
                    info!("{} trained {:?} {}", order.owner, order.unit, tag);
                } else {
                    warn!("{} could not afford its order", order.owner);
                }
                ledger.release(&order.owner);
            }

            let snapshot = world.snapshot();
            let outcome = context.run_tick(&snapshot, &world.signals(), &world.mining_workers());
            world.apply(&context.drain_commands());
            world.step();

            if outcome.tick % report_every == 0 {
                let (friendly, hostile) = world.live_counts();
                let bank = world.resources();
                info!(
                    "Tick {}: {} friendly / {} hostile, bank {}m/{}g, available {:?}, emergency={}, {}",
                    outcome.tick,
                    friendly,
                    hostile,
                    bank.minerals,
                    bank.gas,
                    ledger.available(),
                    context.throttle().is_emergency(),
                    context.throttle().budget().status_message()
                );
            }
        }
    };

    tokio::select! {
        _ = run => info!("Demo finished after {} ticks", demo_ticks),
        _ = shutdown_signal() => info!("Shutting down..."),
    }

    drop(orders_rx);
    let _ = shutdown_tx.send(true);
    for producer in producers {
        if let Err(e) = producer.await {
            error!("Producer task failed: {}", e);
        }
    }

    let stats = ledger.stats();
    info!(
        "Ledger: {} granted, {} denied, {} released, {} reclaimed, {} active",
        stats.successful, stats.failed, stats.releases, stats.gc_reclaimed, stats.active
    );
    println!("{}", metrics.to_prometheus());

    Ok(())
}
