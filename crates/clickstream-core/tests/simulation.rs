//! Integration tests for the simulation engine.
//!
//! Workers run against in-memory producers on a paused Tokio clock, so
//! multi-second runs finish instantly and tick timing is deterministic.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clickstream_core::{
    ClickstreamConfig, Supervisor, SupervisorError, Worker, WorkerConfig, WorkerError,
    stop_channel,
};
use clickstream_producer::{
    EventProducer, MemoryHandle, MemoryProducer, MemoryProducerFactory, ProducerError,
    ProducerFactory, PublishError,
};
use clickstream_site::{SiteTree, load_paths};
use clickstream_types::PageViewEvent;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::time::Instant;

const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://shop.example.com/</loc></url>
  <url><loc>https://shop.example.com/products/shoes/trail</loc></url>
  <url><loc>https://shop.example.com/products/shoes/road</loc></url>
  <url><loc>https://shop.example.com/products/hats</loc></url>
  <url><loc>https://shop.example.com/about</loc></url>
  <url><loc>https://shop.example.com/blog/2024/spring-sale</loc></url>
</urlset>"#;

fn shop() -> Arc<SiteTree> {
    Arc::new(SiteTree::build_from_paths([
        "/",
        "/products/shoes/trail",
        "/products/shoes/road",
        "/products/hats",
        "/about",
        "/blog/2024/spring-sale",
    ]))
}

fn decode(handle: &MemoryHandle) -> Vec<PageViewEvent> {
    handle
        .records()
        .into_iter()
        .map(|r| serde_json::from_value(r.payload).unwrap())
        .collect()
}

/// Hands out producers that are already closed, so the first publish fails.
struct ClosedProducerFactory;

impl ProducerFactory for ClosedProducerFactory {
    type Producer = MemoryProducer;

    async fn create(&self, _worker_id: &str) -> Result<MemoryProducer, ProducerError> {
        let producer = MemoryProducer::new(8);
        let _ = producer.close().await;
        Ok(producer)
    }
}

#[tokio::test]
async fn single_worker_respects_population_cap() {
    let producer = MemoryProducer::new(10_000);
    let config = WorkerConfig {
        max_users: 5,
        ..WorkerConfig::default()
    };
    let mut worker = Worker::new("sim-0", config, shop(), producer, SmallRng::seed_from_u64(11));

    let start = Instant::now();
    for n in 0..10_u64 {
        let summary = worker
            .tick(start + Duration::from_secs(n), 1_700_000_000)
            .await
            .unwrap();
        if n == 0 {
            assert!(summary.arrivals >= 1);
        }
        assert!(summary.population <= 5);
    }
    assert_eq!(worker.report().ticks, 10);
}

#[tokio::test(start_paused = true)]
async fn stop_all_drains_every_producer() {
    let factory = MemoryProducerFactory::new(64).with_delivery_delay(Duration::from_millis(300));
    let supervisor = Supervisor::start(
        3,
        shop(),
        WorkerConfig {
            max_users: 10,
            ..WorkerConfig::default()
        },
        5,
        &factory,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    supervisor.stop_all();

    let stopped_at = Instant::now();
    let reports = supervisor.await_all().await.unwrap();
    // One tick at most, plus the delivery delay of whatever was in flight.
    assert!(stopped_at.elapsed() < Duration::from_secs(2));

    let handles = factory.handles();
    assert_eq!(handles.len(), 3);
    for ((worker_id, handle), report) in handles.iter().zip(&reports) {
        assert_eq!(worker_id, &report.worker_id);
        assert!(handle.is_closed());
        // Everything accepted before close was delivered.
        assert_eq!(u64::try_from(handle.len()).unwrap(), report.events_published);
    }
}

#[tokio::test]
async fn publish_after_close_fails_fast() {
    let producer = MemoryProducer::new(4);
    producer.close().await.unwrap();
    assert!(producer.is_closed());

    let started = Instant::now();
    let result = producer
        .publish("events", "k", &serde_json::json!({ "path": "/" }))
        .await;
    assert!(matches!(result, Err(PublishError::Closed)));
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn worker_failure_surfaces_from_await_all() {
    let config = WorkerConfig::default();
    let supervisor = Supervisor::start(2, shop(), config, 3, &ClosedProducerFactory)
        .await
        .unwrap();

    let result = supervisor.await_all().await;
    assert!(matches!(
        result,
        Err(SupervisorError::Worker {
            source: WorkerError::Publish {
                source: PublishError::Closed,
                ..
            }
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn dropping_every_stop_handle_stops_workers() {
    let producer = MemoryProducer::new(128);
    let handle = producer.handle();
    let rng = SmallRng::seed_from_u64(1);
    let worker = Worker::new("sim-0", WorkerConfig::default(), shop(), producer, rng);
    let (stop, signal) = stop_channel();

    let task = tokio::spawn(worker.run(signal));
    tokio::time::sleep(Duration::from_secs(3)).await;
    drop(stop);

    let report = task.await.unwrap().unwrap();
    assert!(report.ticks >= 2);
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn events_follow_the_wire_format() {
    let factory = MemoryProducerFactory::new(1024);
    let config = WorkerConfig {
        max_users: 8,
        max_ticks: 20,
        ..WorkerConfig::default()
    };
    let site = shop();
    let supervisor = Supervisor::start(1, Arc::clone(&site), config, 21, &factory)
        .await
        .unwrap();
    supervisor.await_all().await.unwrap();

    let (_, handle) = factory.handles().into_iter().next().unwrap();
    let records = handle.records();
    assert!(!records.is_empty());

    for record in &records {
        assert_eq!(record.topic, "events");
        let object = record.payload.as_object().unwrap();
        let keys: BTreeSet<&str> = object.keys().map(String::as_str).collect();
        let arrival: BTreeSet<&str> = ["unix_timestamp", "referrer", "user_id", "path"].into();
        let continuation: BTreeSet<&str> =
            ["unix_timestamp", "page_time_seconds", "user_id", "path"].into();
        assert!(keys == arrival || keys == continuation, "unexpected fields {keys:?}");

        // The record key is the visitor's ID.
        assert_eq!(object.get("user_id").unwrap().as_str().unwrap(), record.key);
    }

    for event in decode(&handle) {
        assert!(site.find(&event.path).is_some(), "{} not in site", event.path);
        if let Some(page_time) = event.page_time_seconds {
            assert!(page_time >= 0.0);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn sitemap_file_drives_a_full_run() {
    let path = std::env::temp_dir().join(format!("clickstream-run-{}.xml", std::process::id()));
    tokio::fs::write(&path, SITEMAP).await.unwrap();
    let paths = load_paths(path.to_str().unwrap()).await.unwrap();
    let _ = tokio::fs::remove_file(&path).await;

    let site = Arc::new(SiteTree::build_from_paths(&paths));
    assert_eq!(site.leaf_count(), 5);

    let yaml = concat!(
        "simulation:\n",
        "  num_workers: 2\n",
        "  max_users_per_worker: 6\n",
        "  max_ticks: 15\n",
        "  seed: 8\n",
    );
    let config = ClickstreamConfig::parse(yaml).unwrap();
    config.validate().unwrap();

    let factory = MemoryProducerFactory::new(1024);
    let supervisor = Supervisor::start(
        config.simulation.worker_count(),
        Arc::clone(&site),
        config.worker_config(),
        config.simulation.seed.unwrap_or_default(),
        &factory,
    )
    .await
    .unwrap();
    let reports = supervisor.await_all().await.unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.ticks, 15);
        assert!(report.final_population <= 6);
        assert!(report.arrivals >= 1);
    }
    let arrival_paths: BTreeSet<String> = factory
        .handles()
        .iter()
        .flat_map(|(_, h)| decode(h))
        .filter(PageViewEvent::is_arrival)
        .map(|e| e.path)
        .collect();
    for path in &arrival_paths {
        let id = site.find(path).unwrap();
        assert!(site.page(id).unwrap().is_leaf());
    }
}
