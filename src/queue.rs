use crate::{
    client::StorageClient,
    configuration::Configuration,
    data::Sample,
    instrument::{Counter, Gauge, Registry, Summary},
};
use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::{
    mem,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

// String constants for instrumentation.
const NAMESPACE: &str = "spillway";
const SUBSYSTEM: &str = "remote_storage";

const RESULT: &str = "result";
const SUCCESS: &str = "success";
const FAILURE: &str = "failure";
const DROPPED: &str = "dropped";

fn fq_name(name: &str) -> String { format!("{}_{}_{}", NAMESPACE, SUBSYSTEM, name) }

#[derive(Clone)]
struct QueueMetrics {
    sent_success: Counter,
    sent_failure: Counter,
    sent_dropped: Counter,
    failed_batches: Counter,
    failed_samples: Counter,
    queue_length: Gauge,
    send_latency: Summary,
}

impl QueueMetrics {
    fn new(registry: &Registry, client_name: &str, queue_capacity: usize) -> QueueMetrics {
        let type_label = ("type", client_name);
        registry.constant(&fq_name("queue_capacity"), &[type_label], queue_capacity as f64);

        QueueMetrics {
            sent_success: registry
                .counter(&fq_name("sent_samples_total"), &[(RESULT, SUCCESS), type_label]),
            sent_failure: registry
                .counter(&fq_name("sent_samples_total"), &[(RESULT, FAILURE), type_label]),
            sent_dropped: registry
                .counter(&fq_name("sent_samples_total"), &[(RESULT, DROPPED), type_label]),
            failed_batches: registry.counter(&fq_name("failed_batches_total"), &[type_label]),
            failed_samples: registry.counter(&fq_name("failed_samples_total"), &[type_label]),
            queue_length: registry.gauge(&fq_name("queue_length"), &[type_label]),
            send_latency: registry.summary(&fq_name("send_latency_seconds"), &[type_label]),
        }
    }
}

/// Fans appended samples out across bounded per-shard queues and forwards
/// batches to a [`StorageClient`].
///
/// The queue is lossy by contract: `append` never blocks and never fails, and
/// a sample bound for a full shard is dropped on the floor.  Within one shard
/// (one series fingerprint) samples reach the client in append order; across
/// shards nothing is promised.
pub struct ShardedQueueManager<C: StorageClient> {
    cfg: Configuration,
    client: Arc<C>,
    senders: RwLock<Option<Vec<Sender<Sample>>>>,
    receivers: Mutex<Option<Vec<Receiver<Sample>>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    metrics: QueueMetrics,
}

impl<C: StorageClient + 'static> ShardedQueueManager<C> {
    /// Builds a new `ShardedQueueManager` sending to the given client.
    pub fn new(client: C, cfg: Configuration, registry: &Registry) -> ShardedQueueManager<C> {
        assert!(cfg.shards > 0, "shard count must be positive");
        assert!(cfg.max_samples_per_send > 0, "batch size must be positive");

        let metrics = QueueMetrics::new(registry, client.name(), cfg.queue_capacity);

        let mut senders = Vec::with_capacity(cfg.shards);
        let mut receivers = Vec::with_capacity(cfg.shards);
        for _ in 0..cfg.shards {
            let (tx, rx) = bounded(cfg.queue_capacity);
            senders.push(tx);
            receivers.push(rx);
        }

        ShardedQueueManager {
            cfg,
            client: Arc::new(client),
            senders: RwLock::new(Some(senders)),
            receivers: Mutex::new(Some(receivers)),
            workers: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Queues a sample to be sent to the remote storage.
    ///
    /// The sample's shard follows from its metric's fingerprint.  If that
    /// shard's queue is full, or the manager has been stopped, the sample is
    /// dropped and counted; producers are never blocked.
    pub fn append(&self, sample: Sample) {
        let senders = self.senders.read();
        let senders = match senders.as_ref() {
            Some(senders) => senders,
            None => {
                self.metrics.sent_dropped.inc();
                return;
            },
        };

        let shard = (sample.metric.fingerprint() % senders.len() as u64) as usize;
        if senders[shard].try_send(sample).is_err() {
            self.metrics.sent_dropped.inc();
            warn!(shard, "remote storage queue full, discarding sample");
        }
    }

    /// Whether producers should slow down.  Always `false`: a lossy queue
    /// drops samples when backlogged instead of asking for throttling.
    pub fn needs_throttling(&self) -> bool { false }

    /// The number of samples currently queued across all shards.
    ///
    /// Also refreshes the exported `queue_length` gauge.
    pub fn queue_length(&self) -> usize {
        let length = match self.senders.read().as_ref() {
            Some(senders) => senders.iter().map(|tx| tx.len()).sum(),
            None => 0,
        };
        self.metrics.queue_length.set(length as u64);
        length
    }

    /// Spawns one worker per shard to continuously send samples to the remote
    /// storage.  Calling `run` on an already running manager is a no-op.
    pub fn run(&self) {
        let receivers = match self.receivers.lock().take() {
            Some(receivers) => receivers,
            None => return,
        };

        let mut workers = self.workers.lock();
        for (shard, rx) in receivers.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let metrics = self.metrics.clone();
            let max_batch = self.cfg.max_samples_per_send;
            let deadline = self.cfg.batch_send_deadline;

            let handle = thread::Builder::new()
                .name(format!("remote-shard-{}", shard))
                .spawn(move || run_shard(rx, client, metrics, max_batch, deadline))
                .expect("failed to spawn shard worker");
            workers.push(handle);
        }
    }

    /// Stops sending samples to the remote storage and waits for every worker
    /// to flush its pending batch and exit.
    ///
    /// Closing the shard channels is the only shutdown signal the workers
    /// get; each drains what its channel still holds, flushes once, and
    /// exits.
    pub fn stop(&self) {
        info!("stopping remote storage queue");
        drop(self.senders.write().take());

        let workers = mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
        info!("remote storage queue stopped");
    }
}

fn run_shard<C: StorageClient>(
    rx: Receiver<Sample>,
    client: Arc<C>,
    metrics: QueueMetrics,
    max_batch: usize,
    deadline: Duration,
) {
    // Send batches of at most `max_batch` samples to the remote storage.  If
    // fewer than that accumulate, flush them out after the deadline anyway.
    let mut pending: Vec<Sample> = Vec::with_capacity(max_batch);
    let mut flush_at = after(deadline);

    loop {
        select! {
            recv(rx) -> sample => match sample {
                Ok(sample) => {
                    pending.push(sample);
                    while pending.len() >= max_batch {
                        let batch: Vec<Sample> = pending.drain(..max_batch).collect();
                        send_samples(&*client, &metrics, &batch);
                        flush_at = after(deadline);
                    }
                },
                Err(_) => {
                    if !pending.is_empty() {
                        debug!(count = pending.len(), "flushing remaining samples to remote storage");
                        send_samples(&*client, &metrics, &pending);
                    }
                    return;
                },
            },
            recv(flush_at) -> _ => {
                if !pending.is_empty() {
                    send_samples(&*client, &metrics, &pending);
                    pending.clear();
                }
                flush_at = after(deadline);
            },
        }
    }
}

fn send_samples<C: StorageClient + ?Sized>(client: &C, metrics: &QueueMetrics, batch: &[Sample]) {
    // Batches go out on a best-effort basis; a batch that fails is dropped on
    // the floor, not re-queued.
    let start = Instant::now();
    let result = client.store(batch);
    let elapsed = start.elapsed();

    match result {
        Ok(()) => metrics.sent_success.add(batch.len() as u64),
        Err(err) => {
            warn!(count = batch.len(), error = %err, "error sending samples to remote storage");
            metrics.failed_batches.inc();
            metrics.failed_samples.add(batch.len() as u64);
            metrics.sent_failure.add(batch.len() as u64);
        },
    }
    metrics.send_latency.observe(elapsed);
}
