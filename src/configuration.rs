use crate::{client::StorageClient, instrument::Registry, queue::ShardedQueueManager};
use std::time::Duration;

/// A configuration builder for [`ShardedQueueManager`].
#[derive(Clone)]
pub struct Configuration {
    pub(crate) queue_capacity: usize,
    pub(crate) shards: usize,
    pub(crate) max_samples_per_send: usize,
    pub(crate) batch_send_deadline: Duration,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            queue_capacity: 10240,
            shards: 10,
            max_samples_per_send: 100,
            batch_send_deadline: Duration::from_secs(5),
        }
    }
}

impl Configuration {
    /// Creates a new `Configuration` with default values.
    pub fn new() -> Configuration { Default::default() }

    /// Sets the per-shard queue capacity.
    ///
    /// Defaults to `10240`.
    ///
    /// Each shard buffers up to this many samples before `append` starts
    /// dropping them on the floor.  Total queue memory is bounded by
    /// `shards * queue_capacity` samples.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the number of shards, i.e. the amount of send concurrency.
    ///
    /// Defaults to `10`.
    ///
    /// Samples for the same series always land in the same shard, which is
    /// what keeps per-series delivery ordered.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Sets the maximum number of samples per send.
    ///
    /// Defaults to `100`.
    pub fn max_samples_per_send(mut self, max: usize) -> Self {
        self.max_samples_per_send = max;
        self
    }

    /// Sets the maximum time a sample may wait in a shard's pending batch
    /// before being flushed regardless of batch size.
    ///
    /// Defaults to 5 seconds.
    pub fn batch_send_deadline(mut self, deadline: Duration) -> Self {
        self.batch_send_deadline = deadline;
        self
    }

    /// Creates a `ShardedQueueManager` based on this configuration.
    pub fn build<C: StorageClient + 'static>(
        self,
        client: C,
        registry: &Registry,
    ) -> ShardedQueueManager<C> {
        ShardedQueueManager::new(client, self, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::Configuration;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let cfg = Configuration::new();
        assert_eq!(cfg.queue_capacity, 10240);
        assert_eq!(cfg.shards, 10);
        assert_eq!(cfg.max_samples_per_send, 100);
        assert_eq!(cfg.batch_send_deadline, Duration::from_secs(5));
    }
}
