//! The per-worker simulation loop.
//!
//! A [`Worker`] owns a live set of [`SimulatedUser`]s, a seeded random
//! source and an event producer. Nothing else touches that state, so the
//! loop needs no locks. Each tick runs two phases:
//!
//! 1. **Admission** -- if the population is below `max_users`, a random
//!    number of visitors arrive on random leaf pages, each emitting an
//!    arrival event with a referrer.
//! 2. **Update** -- every visitor, oldest first, accrues dwell time. After
//!    `min_dwell`, a squared uniform draw decides whether they leave, jump
//!    to a random leaf, follow a link, or stay. Everyone who stays on the
//!    site emits a continuation event carrying the dwell time measured at
//!    tick start.
//!
//! Within a tick, arrivals are published before continuations, and both in
//! live-set order. The stop signal is checked only between ticks; a tick
//! that has started always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clickstream_producer::{EventProducer, PublishError};
use clickstream_site::SiteTree;
use clickstream_site::tree::ROOT_PATH;
use clickstream_types::{PageViewEvent, UserId, random_referrer};
use rand::rngs::SmallRng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::random::{admission_count, event_probability, jitter_duration};
use crate::stop::StopSignal;
use crate::user::SimulatedUser;

/// Draws above this leave the site.
const DEPART_THRESHOLD: f64 = 0.98;

/// Draws above this (and not departing) jump to a random leaf.
const JUMP_THRESHOLD: f64 = 0.90;

/// Draws above this (and not jumping) follow a link from the current page.
const ADVANCE_THRESHOLD: f64 = 0.80;

/// Errors that end a worker's run.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The producer rejected a record.
    #[error("worker {worker_id} failed to publish: {source}")]
    Publish {
        /// The worker whose publish failed.
        worker_id: String,
        /// The underlying publish error.
        source: PublishError,
    },
}

/// What a visitor does this tick once they have dwelt long enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Leave the site. No event is emitted.
    Depart,
    /// Jump to a random leaf page.
    Jump,
    /// Follow a link: a random child, or the parent from a leaf.
    Advance,
    /// Stay on the current page.
    Stay,
}

impl Navigation {
    /// Classify a draw from [`event_probability`].
    pub fn from_probability(p: f64) -> Self {
        if p > DEPART_THRESHOLD {
            Self::Depart
        } else if p > JUMP_THRESHOLD {
            Self::Jump
        } else if p > ADVANCE_THRESHOLD {
            Self::Advance
        } else {
            Self::Stay
        }
    }
}

/// Settings for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Topic events are published to.
    pub topic: String,
    /// Population cap.
    pub max_users: usize,
    /// Nominal time between ticks.
    pub tick_interval: Duration,
    /// Maximum deviation from `tick_interval`, either way.
    pub tick_jitter: Duration,
    /// Dwell required before a visitor considers navigating.
    pub min_dwell: Duration,
    /// Ticks to run before stopping on its own (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            topic: String::from("events"),
            max_users: 100,
            tick_interval: Duration::from_secs(1),
            tick_jitter: Duration::from_millis(200),
            min_dwell: Duration::from_secs(5),
            max_ticks: 0,
        }
    }
}

/// Summary of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed (1-based).
    pub tick: u64,
    /// Visitors admitted.
    pub arrivals: usize,
    /// Continuation events published.
    pub continuations: usize,
    /// Visitors who left.
    pub departures: usize,
    /// Visitors who jumped to a random leaf.
    pub jumps: usize,
    /// Visitors who followed a link.
    pub advances: usize,
    /// Live population at the end of the tick.
    pub population: usize,
}

impl TickSummary {
    /// Total events published during the tick.
    pub const fn events(&self) -> usize {
        self.arrivals.saturating_add(self.continuations)
    }
}

/// Totals reported when a worker returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// The worker's identity.
    pub worker_id: String,
    /// Ticks completed.
    pub ticks: u64,
    /// Visitors admitted over the run.
    pub arrivals: u64,
    /// Visitors who left over the run.
    pub departures: u64,
    /// Events accepted by the producer over the run.
    pub events_published: u64,
    /// Live population when the worker stopped.
    pub final_population: usize,
}

/// One independent simulation loop.
pub struct Worker<P> {
    id: String,
    config: WorkerConfig,
    site: Arc<SiteTree>,
    producer: P,
    rng: SmallRng,
    users: Vec<SimulatedUser>,
    report: WorkerReport,
}

impl<P: EventProducer> Worker<P> {
    /// Create a worker with an empty population.
    pub fn new(
        id: impl Into<String>,
        config: WorkerConfig,
        site: Arc<SiteTree>,
        producer: P,
        rng: SmallRng,
    ) -> Self {
        let id = id.into();
        Self {
            report: WorkerReport {
                worker_id: id.clone(),
                ..WorkerReport::default()
            },
            id,
            config,
            site,
            producer,
            rng,
            users: Vec::new(),
        }
    }

    /// The worker's identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current live population.
    pub fn population(&self) -> usize {
        self.users.len()
    }

    /// The live set, oldest first.
    pub fn users(&self) -> &[SimulatedUser] {
        &self.users
    }

    /// The worker's producer.
    pub const fn producer(&self) -> &P {
        &self.producer
    }

    /// Totals so far.
    pub const fn report(&self) -> &WorkerReport {
        &self.report
    }

    /// Run ticks until `stop` fires (or `max_ticks` is reached), then drain
    /// and close the producer.
    ///
    /// The producer is closed on every exit path, including a publish
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Publish`] if the producer rejected a record.
    pub async fn run(mut self, mut stop: StopSignal) -> Result<WorkerReport, WorkerError> {
        info!(
            worker = self.id,
            max_users = self.config.max_users,
            tick_interval_ms = self.config.tick_interval.as_millis(),
            "worker starting"
        );

        let outcome = self.run_ticks(&mut stop).await;

        info!(
            worker = self.id,
            in_flight = self.producer.in_flight(),
            "closing producer"
        );
        match self.producer.close().await {
            Ok(()) => debug!(worker = self.id, "producer drained"),
            Err(e) => warn!(worker = self.id, error = %e, "producer close rejected"),
        }

        self.report.final_population = self.users.len();
        match outcome {
            Ok(()) => {
                info!(
                    worker = self.id,
                    ticks = self.report.ticks,
                    arrivals = self.report.arrivals,
                    departures = self.report.departures,
                    events = self.report.events_published,
                    "worker stopped"
                );
                Ok(self.report)
            }
            Err(e) => {
                error!(worker = self.id, error = %e, "worker failed");
                Err(e)
            }
        }
    }

    async fn run_ticks(&mut self, stop: &mut StopSignal) -> Result<(), WorkerError> {
        while !stop.is_stopped() {
            if self.config.max_ticks > 0 && self.report.ticks >= self.config.max_ticks {
                info!(
                    worker = self.id,
                    max_ticks = self.config.max_ticks,
                    "tick limit reached"
                );
                break;
            }

            let pause = jitter_duration(
                self.config.tick_interval,
                self.config.tick_jitter,
                &mut self.rng,
            );
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = stop.stopped() => break,
            }

            let summary = self.tick(Instant::now(), Utc::now().timestamp()).await?;
            debug!(
                worker = self.id,
                tick = summary.tick,
                arrivals = summary.arrivals,
                continuations = summary.continuations,
                departures = summary.departures,
                population = summary.population,
                "tick complete"
            );
        }
        Ok(())
    }

    /// Execute one tick at monotonic time `now`, stamping events with
    /// `unix_now`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Publish`] on the first rejected record. The
    /// rest of the tick is abandoned.
    pub async fn tick(&mut self, now: Instant, unix_now: i64) -> Result<TickSummary, WorkerError> {
        let mut summary = TickSummary {
            tick: self.report.ticks.saturating_add(1),
            ..TickSummary::default()
        };

        self.admit_users(now, unix_now, &mut summary).await?;
        self.update_users(now, unix_now, &mut summary).await?;

        summary.population = self.users.len();
        self.report.ticks = summary.tick;
        Ok(summary)
    }

    async fn admit_users(
        &mut self,
        now: Instant,
        unix_now: i64,
        summary: &mut TickSummary,
    ) -> Result<(), WorkerError> {
        let count = admission_count(self.config.max_users, self.users.len(), &mut self.rng);

        for _ in 0..count {
            let user_id = UserId::random(&mut self.rng);
            let page = self.site.random_leaf(self.site.root(), &mut self.rng);
            let referrer = random_referrer(&mut self.rng);
            self.users.push(SimulatedUser::arrive(user_id, page, now));

            let path = self.site.path(page).unwrap_or(ROOT_PATH);
            let event = PageViewEvent::arrival(unix_now, user_id, path, referrer);
            self.publish(user_id, &event).await?;

            summary.arrivals = summary.arrivals.saturating_add(1);
            self.report.arrivals = self.report.arrivals.saturating_add(1);
        }
        Ok(())
    }

    async fn update_users(
        &mut self,
        now: Instant,
        unix_now: i64,
        summary: &mut TickSummary,
    ) -> Result<(), WorkerError> {
        let mut idx: usize = 0;

        while let Some(user) = self.users.get_mut(idx) {
            let dwell = user.dwell(now);
            let navigation = if dwell > self.config.min_dwell {
                Navigation::from_probability(event_probability(&mut self.rng))
            } else {
                Navigation::Stay
            };

            match navigation {
                Navigation::Depart => {
                    self.users.remove(idx);
                    summary.departures = summary.departures.saturating_add(1);
                    self.report.departures = self.report.departures.saturating_add(1);
                    continue;
                }
                Navigation::Jump => {
                    let page = self.site.random_leaf(self.site.root(), &mut self.rng);
                    user.navigate(page, now);
                    summary.jumps = summary.jumps.saturating_add(1);
                }
                Navigation::Advance => {
                    // A childless root has nowhere to go; the visitor stays.
                    let page = self
                        .site
                        .random_next(user.current_page, &mut self.rng)
                        .unwrap_or(user.current_page);
                    user.navigate(page, now);
                    summary.advances = summary.advances.saturating_add(1);
                }
                Navigation::Stay => {}
            }

            let user_id = user.user_id;
            let path = self.site.path(user.current_page).unwrap_or(ROOT_PATH);
            let event = PageViewEvent::continuation(unix_now, user_id, path, dwell.as_secs_f64());
            self.publish(user_id, &event).await?;

            summary.continuations = summary.continuations.saturating_add(1);
            idx = idx.saturating_add(1);
        }
        Ok(())
    }

    async fn publish(&mut self, user_id: UserId, event: &PageViewEvent) -> Result<(), WorkerError> {
        let key = user_id.to_string();
        self.producer
            .publish(&self.config.topic, &key, event)
            .await
            .map_err(|source| WorkerError::Publish {
                worker_id: self.id.clone(),
                source,
            })?;
        self.report.events_published = self.report.events_published.saturating_add(1);
        Ok(())
    }
}

impl<P> std::fmt::Debug for Worker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("population", &self.users.len())
            .field("ticks", &self.report.ticks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::BTreeMap;

    use clickstream_producer::{MemoryHandle, MemoryProducer};
    use clickstream_types::SAMPLE_REFERRERS;
    use rand::SeedableRng;

    use super::*;
    use crate::stop::stop_channel;

    fn site() -> Arc<SiteTree> {
        Arc::new(SiteTree::build_from_paths([
            "/",
            "/about",
            "/blog/2024/hello",
            "/blog/2024/world",
            "/docs/intro",
            "/docs/advanced/tuning",
        ]))
    }

    fn worker(max_users: usize, seed: u64) -> (Worker<MemoryProducer>, MemoryHandle) {
        worker_with(
            WorkerConfig {
                max_users,
                ..WorkerConfig::default()
            },
            seed,
        )
    }

    /// A worker whose visitors may navigate (or leave) from their first
    /// update after arriving.
    fn restless_worker(max_users: usize, seed: u64) -> (Worker<MemoryProducer>, MemoryHandle) {
        worker_with(
            WorkerConfig {
                max_users,
                min_dwell: Duration::ZERO,
                ..WorkerConfig::default()
            },
            seed,
        )
    }

    fn worker_with(config: WorkerConfig, seed: u64) -> (Worker<MemoryProducer>, MemoryHandle) {
        let producer = MemoryProducer::new(10_000);
        let handle = producer.handle();
        let rng = SmallRng::seed_from_u64(seed);
        (Worker::new("sim-test", config, site(), producer, rng), handle)
    }

    async fn settle(worker: &Worker<MemoryProducer>) {
        while worker.producer().in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    }

    fn events(handle: &MemoryHandle) -> Vec<PageViewEvent> {
        handle
            .records()
            .into_iter()
            .map(|r| serde_json::from_value(r.payload).unwrap())
            .collect()
    }

    #[test]
    fn navigation_thresholds() {
        assert_eq!(Navigation::from_probability(0.99), Navigation::Depart);
        assert_eq!(Navigation::from_probability(0.98), Navigation::Jump);
        assert_eq!(Navigation::from_probability(0.95), Navigation::Jump);
        assert_eq!(Navigation::from_probability(0.90), Navigation::Advance);
        assert_eq!(Navigation::from_probability(0.85), Navigation::Advance);
        assert_eq!(Navigation::from_probability(0.80), Navigation::Stay);
        assert_eq!(Navigation::from_probability(0.0), Navigation::Stay);
    }

    #[tokio::test]
    async fn first_tick_publishes_arrivals_then_continuations() {
        let (mut worker, handle) = worker(10, 1);
        let summary = worker.tick(Instant::now(), 1_700_000_000).await.unwrap();
        settle(&worker).await;

        assert!(summary.arrivals >= 1 && summary.arrivals <= 10);
        assert_eq!(summary.continuations, summary.arrivals);
        assert_eq!(summary.departures, 0);
        assert_eq!(summary.population, summary.arrivals);

        let published = events(&handle);
        assert_eq!(published.len(), summary.events());
        let (arrivals, continuations) = published.split_at(summary.arrivals);
        for event in arrivals {
            assert!(event.page_time_seconds.is_none());
            let referrer = event.referrer.as_deref().unwrap();
            assert!(SAMPLE_REFERRERS.contains(&referrer));
            assert_eq!(event.unix_timestamp, 1_700_000_000);
        }
        for event in continuations {
            assert!(event.referrer.is_none());
            assert_eq!(event.page_time_seconds, Some(0.0));
        }
        // Same visitors, same order.
        let arrival_ids: Vec<UserId> = arrivals.iter().map(|e| e.user_id).collect();
        let continuation_ids: Vec<UserId> = continuations.iter().map(|e| e.user_id).collect();
        assert_eq!(arrival_ids, continuation_ids);
    }

    #[tokio::test]
    async fn arrivals_land_on_leaves() {
        let (mut worker, handle) = worker(50, 2);
        worker.tick(Instant::now(), 0).await.unwrap();
        settle(&worker).await;

        let tree = site();
        for event in events(&handle).iter().filter(|e| e.is_arrival()) {
            let id = tree.find(&event.path).unwrap();
            assert!(tree.page(id).unwrap().is_leaf(), "{} is not a leaf", event.path);
        }
    }

    #[tokio::test]
    async fn population_never_exceeds_max() {
        let (mut worker, _handle) = worker(7, 3);
        let start = Instant::now();
        for n in 0..120_u64 {
            let summary = worker
                .tick(start + Duration::from_secs(n), 0)
                .await
                .unwrap();
            assert!(summary.population <= 7);
            assert!(worker.population() <= 7);
        }
    }

    #[tokio::test]
    async fn visitors_eventually_depart() {
        let (mut worker, _handle) = restless_worker(20, 3);
        let start = Instant::now();
        for n in 1..=200_u64 {
            worker.tick(start + Duration::from_secs(n), 0).await.unwrap();
        }
        assert!(worker.report().departures > 0);
        assert!(worker.report().arrivals > 20);
    }

    #[tokio::test]
    async fn page_time_measures_since_last_change() {
        let (mut worker, handle) = worker(20, 4);
        let start = Instant::now();
        let mut now = start;

        for _ in 0..40 {
            settle(&worker).await;
            let before: BTreeMap<UserId, Instant> = worker
                .users()
                .iter()
                .map(|u| (u.user_id, u.last_change))
                .collect();
            let already_published = handle.len();

            now += Duration::from_secs(1);
            worker.tick(now, 0).await.unwrap();
            settle(&worker).await;

            for event in events(&handle).iter().skip(already_published) {
                let Some(page_time) = event.page_time_seconds else {
                    continue;
                };
                assert!(page_time >= 0.0);
                match before.get(&event.user_id) {
                    // Existing visitor: dwell since the last change before this tick.
                    Some(last_change) => {
                        let expected = now.duration_since(*last_change).as_secs_f64();
                        assert!((page_time - expected).abs() < 1e-9);
                    }
                    // Admitted this tick.
                    None => assert!(page_time.abs() < 1e-9),
                }
            }
        }
    }

    #[tokio::test]
    async fn navigation_resets_dwell_clock() {
        let (mut worker, _handle) = worker(20, 5);
        let start = Instant::now();
        let mut now = start;
        let mut resets = 0;

        for _ in 0..60 {
            now += Duration::from_secs(1);
            let summary = worker.tick(now, 0).await.unwrap();
            resets += summary.jumps + summary.advances;
            for user in worker.users() {
                assert!(user.dwell(now) <= Duration::from_secs(60));
            }
        }
        assert!(resets > 0);
        // Anyone who moved this tick has a fresh clock.
        assert!(worker.users().iter().any(|u| u.last_change > start));
    }

    #[tokio::test]
    async fn departed_visitors_emit_nothing_further() {
        let (mut worker, handle) = restless_worker(15, 6);
        let start = Instant::now();
        let mut gone: Vec<UserId> = Vec::new();

        for n in 1..=200_u64 {
            settle(&worker).await;
            let already_published = handle.len();
            let before: Vec<UserId> = worker.users().iter().map(|u| u.user_id).collect();

            let summary = worker.tick(start + Duration::from_secs(n), 0).await.unwrap();
            settle(&worker).await;

            let after: Vec<UserId> = worker.users().iter().map(|u| u.user_id).collect();
            let left: Vec<UserId> = before.into_iter().filter(|id| !after.contains(id)).collect();
            assert_eq!(left.len(), summary.departures);
            gone.extend(left);

            // Neither this tick's leavers nor earlier ones appear again.
            let fresh = events(&handle);
            for event in fresh.iter().skip(already_published) {
                assert!(!gone.contains(&event.user_id));
            }
        }
        assert!(!gone.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tick_events_keep_publish_order() {
        let (mut worker, handle) = restless_worker(40, 11);
        let start = Instant::now();
        let mut ticks: Vec<(TickSummary, Vec<UserId>)> = Vec::new();
        for n in 1..=30_u64 {
            let summary = worker.tick(start + Duration::from_secs(n), 0).await.unwrap();
            let users = worker.users().iter().map(|u| u.user_id).collect();
            ticks.push((summary, users));
        }
        worker.producer().close().await.unwrap();

        let published = events(&handle);
        let mut rest = published.as_slice();
        for (summary, users) in &ticks {
            let (tick_events, remaining) = rest.split_at(summary.events());
            rest = remaining;
            let (arrivals, continuations) = tick_events.split_at(summary.arrivals);

            // Arrivals first, in admission order, then one continuation per
            // remaining visitor in live-set order.
            let arrived: Vec<UserId> = arrivals.iter().map(|e| e.user_id).collect();
            let newest = users.get(users.len() - summary.arrivals..).unwrap();
            assert!(arrivals.iter().all(PageViewEvent::is_arrival));
            assert_eq!(arrived, newest);

            let continued: Vec<UserId> = continuations.iter().map(|e| e.user_id).collect();
            assert!(continuations.iter().all(|e| !e.is_arrival()));
            assert_eq!(&continued, users);
        }
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_fatal() {
        let (mut worker, _handle) = worker(5, 7);
        worker.producer().close().await.unwrap();

        let result = worker.tick(Instant::now(), 0).await;
        assert!(matches!(
            result,
            Err(WorkerError::Publish {
                source: PublishError::Closed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_stopped() {
        let (worker, handle) = worker(5, 8);
        let (stop, signal) = stop_channel();
        stop.stop();

        let report = worker.run(signal).await.unwrap();
        assert_eq!(report.ticks, 0);
        assert!(handle.is_closed());
        assert!(handle.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_honors_max_ticks_and_closes_producer() {
        let producer = MemoryProducer::new(1000);
        let handle = producer.handle();
        let config = WorkerConfig {
            max_users: 4,
            max_ticks: 5,
            ..WorkerConfig::default()
        };
        let worker = Worker::new("sim-0", config, site(), producer, SmallRng::seed_from_u64(9));
        let (_stop, signal) = stop_channel();

        let report = worker.run(signal).await.unwrap();
        assert_eq!(report.ticks, 5);
        assert_eq!(report.worker_id, "sim-0");
        assert!(report.final_population <= 4);
        assert!(handle.is_closed());
        assert_eq!(u64::try_from(handle.len()).unwrap(), report.events_published);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_sleep_ends_run_without_another_tick() {
        let (worker, handle) = worker(5, 10);
        let (stop, signal) = stop_channel();

        let task = tokio::spawn(worker.run(signal));
        // Ticks land between 0.8s and 1.2s apart; stop well inside the
        // first sleep.
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.ticks, 0);
        assert!(handle.is_closed());
    }
}
