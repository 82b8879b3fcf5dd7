//! Spawning, stopping and awaiting workers.
//!
//! The [`Supervisor`] creates one producer per worker, spawns every worker
//! onto the runtime, and holds the only [`StopHandle`]. Workers share the
//! site tree read-only and nothing else.

use std::sync::Arc;

use clickstream_producer::{EventProducer, ProducerError, ProducerFactory};
use clickstream_site::SiteTree;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::stop::{StopHandle, stop_channel};
use crate::worker::{Worker, WorkerConfig, WorkerError, WorkerReport};

/// Errors from starting or awaiting workers.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A worker count of zero was requested.
    #[error("at least one worker is required")]
    NoWorkers,

    /// A worker's producer could not be created.
    #[error("failed to create producer for {worker_id}: {source}")]
    Producer {
        /// The worker whose producer failed.
        worker_id: String,
        /// The underlying producer error.
        source: ProducerError,
    },

    /// A worker ended with an error.
    #[error("worker error: {source}")]
    Worker {
        /// The underlying worker error.
        #[from]
        source: WorkerError,
    },

    /// A worker task panicked or was cancelled.
    #[error("worker {worker_id} did not finish: {message}")]
    Panicked {
        /// The worker whose task failed.
        worker_id: String,
        /// Description of the join failure.
        message: String,
    },
}

type WorkerTask = JoinHandle<Result<WorkerReport, WorkerError>>;

/// Owns the running workers and their shared stop signal.
#[derive(Debug)]
pub struct Supervisor {
    stop: StopHandle,
    workers: Vec<(String, WorkerTask)>,
}

impl Supervisor {
    /// Create `worker_count` producers and spawn one worker per producer.
    ///
    /// Worker `i` is named `sim-{i}`. Each worker's random source is derived
    /// from `seed`, so two runs with the same seed and the same tick timing
    /// produce the same visitors.
    ///
    /// Producers are created before any worker starts. If one fails, those
    /// already created are closed and nothing is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NoWorkers`] for a zero count, or
    /// [`SupervisorError::Producer`] if a producer cannot be created.
    pub async fn start<F: ProducerFactory>(
        worker_count: usize,
        site: Arc<SiteTree>,
        config: WorkerConfig,
        seed: u64,
        factory: &F,
    ) -> Result<Self, SupervisorError> {
        if worker_count == 0 {
            return Err(SupervisorError::NoWorkers);
        }

        let mut producers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let worker_id = format!("sim-{i}");
            match factory.create(&worker_id).await {
                Ok(producer) => producers.push((worker_id, producer)),
                Err(source) => {
                    error!(worker = worker_id, error = %source, "producer creation failed");
                    for (id, created) in &producers {
                        if let Err(e) = created.close().await {
                            warn!(worker = id, error = %e, "closing unused producer failed");
                        }
                    }
                    return Err(SupervisorError::Producer { worker_id, source });
                }
            }
        }

        let (stop, _signal) = stop_channel();
        let mut master = SmallRng::seed_from_u64(seed);
        let workers = producers
            .into_iter()
            .map(|(worker_id, producer)| {
                let rng = SmallRng::from_rng(&mut master);
                let worker = Worker::new(
                    worker_id.clone(),
                    config.clone(),
                    Arc::clone(&site),
                    producer,
                    rng,
                );
                let task = tokio::spawn(worker.run(stop.subscribe()));
                (worker_id, task)
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            pages = site.len(),
            leaves = site.leaf_count(),
            max_users = config.max_users,
            seed = seed,
            "workers started"
        );
        Ok(Self { stop, workers })
    }

    /// Number of workers started.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// A clone of the stop handle, for signal handlers.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask every worker to stop after its current tick.
    pub fn stop_all(&self) {
        if !self.stop.is_stopped() {
            info!(workers = self.workers.len(), "stopping all workers");
        }
        self.stop.stop();
    }

    /// Wait for every worker to return.
    ///
    /// Does not itself stop the workers; call [`stop_all`](Self::stop_all)
    /// (or use a [`stop_handle`](Self::stop_handle)) first unless they run
    /// with a tick limit.
    ///
    /// Every worker is awaited even after one fails, so every producer is
    /// drained. All failures are logged.
    ///
    /// # Errors
    ///
    /// Returns the first worker failure, in worker order.
    pub async fn await_all(self) -> Result<Vec<WorkerReport>, SupervisorError> {
        let Self { stop, workers } = self;
        let mut reports = Vec::with_capacity(workers.len());
        let mut first_error: Option<SupervisorError> = None;

        for (worker_id, task) in workers {
            let outcome = match task.await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => Err(SupervisorError::from(e)),
                Err(join) => Err(SupervisorError::Panicked {
                    worker_id: worker_id.clone(),
                    message: join.to_string(),
                }),
            };
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(worker = worker_id, error = %e, "worker failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        // Held until here so workers never see the handle dropped early.
        drop(stop);

        match first_error {
            Some(e) => Err(e),
            None => {
                let events: u64 = reports.iter().map(|r| r.events_published).sum();
                info!(workers = reports.len(), events = events, "all workers finished");
                Ok(reports)
            }
        }
    }
}
