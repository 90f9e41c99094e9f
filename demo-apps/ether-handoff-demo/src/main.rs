use anyhow::{ensure, Context, Result};
use ether_core::{Ether, EtherConfig, Retain};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A value a producer wants to hand to a consumer without knowing when it will ask
#[derive(Debug)]
struct Report {
    id: u32,
    body: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ether_core=debug,ether_handoff_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EtherConfig::from_env();
    tracing::info!("🧪 Ether handoff demo");
    tracing::info!("   Default retention: {:?}", config.default_retention);

    let ether = Ether::with_config(config);

    demo_consumer_first(&ether).await?;
    demo_producer_first(&ether).await?;
    demo_burst_of_waiters(&ether).await?;
    demo_timed_expiry(&ether).await?;
    demo_flush(&ether).await?;

    tracing::info!("✅ All scenarios passed!");

    Ok(())
}

/// Consumer subscribes before the producer has stored anything
async fn demo_consumer_first(ether: &Ether) -> Result<()> {
    tracing::info!("Scenario: consumer first");

    let key = Ether::generate_key();
    let pending = ether.subscribe::<Report>(&key);

    let producer = {
        let ether = ether.clone();
        let key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let report = Report {
                id: 1,
                body: "late but delivered".to_string(),
            };
            ether.hold_with_key(key, report, Retain::UntilObserved)
        })
    };

    let report = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .context("timed out waiting for report")??
        .context("subscription ended without a report")?;
    producer.await?;

    ensure!(report.id == 1, "unexpected report {:?}", report);
    ensure!(ether.is_empty(), "until-observed report should be consumed");
    tracing::info!("   Received report {} ({})", report.id, report.body);

    Ok(())
}

/// Producer stores first; the value is consumed by exactly one reader
async fn demo_producer_first(ether: &Ether) -> Result<()> {
    tracing::info!("Scenario: producer first");

    let key = ether.hold(
        Report {
            id: 2,
            body: "waiting in the ether".to_string(),
        },
        Retain::UntilObserved,
    );

    let first = ether.get::<Report>(&key)?;
    let second = ether.get::<Report>(&key)?;

    ensure!(first.is_some(), "first read should see the report");
    ensure!(second.is_none(), "second read should find nothing");
    tracing::info!("   First read got a report, second read got nothing");

    Ok(())
}

/// Several consumers wait on one key; a single put reaches all of them
async fn demo_burst_of_waiters(ether: &Ether) -> Result<()> {
    tracing::info!("Scenario: burst of waiters");

    let key = Ether::generate_key();
    let pending: Vec<_> = (0..5).map(|_| ether.subscribe::<Report>(&key)).collect();
    tracing::info!("   {} waiters registered", ether.waiters_for(&key));

    let report = Arc::new(Report {
        id: 3,
        body: "broadcast".to_string(),
    });
    ether.put(key.as_str(), Arc::clone(&report), Retain::UntilObserved);

    let mut received = 0;
    for result in join_all(pending).await {
        let observed = result?.context("waiter ended without a report")?;
        ensure!(Arc::ptr_eq(&report, &observed), "waiter saw a different report");
        received += 1;
    }

    ensure!(received == 5, "expected 5 deliveries, got {}", received);
    ensure!(!ether.contains_key(&key), "report should not be held after the burst");
    tracing::info!("   All {} waiters received the same report", received);

    Ok(())
}

/// Timed values are readable many times, then disappear
async fn demo_timed_expiry(ether: &Ether) -> Result<()> {
    tracing::info!("Scenario: timed expiry");

    let retention = Duration::from_millis(300);
    let key = ether.hold(
        Report {
            id: 4,
            body: "short lived".to_string(),
        },
        Retain::For(retention),
    );

    for _ in 0..3 {
        ensure!(ether.get::<Report>(&key)?.is_some(), "timed report should be readable");
    }

    let start = Instant::now();
    while ether.contains_key(&key) {
        ensure!(
            start.elapsed() < retention * 10,
            "timed report never expired"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tracing::info!("   Expired after ~{:?}", start.elapsed());

    Ok(())
}

/// Flush drops stored values and releases pending waiters
async fn demo_flush(ether: &Ether) -> Result<()> {
    tracing::info!("Scenario: flush");

    ether.hold(1u32, Retain::Default);
    let pending = ether.subscribe::<u32>("never-produced");

    let stats = ether.flush();
    let outcome = pending.await?;

    ensure!(outcome.is_none(), "flushed waiter should end without a value");
    ensure!(ether.is_empty(), "flush should clear the store");
    tracing::info!(
        "   Flushed {} resources and {} waiters",
        stats.resources,
        stats.waiters
    );

    Ok(())
}
