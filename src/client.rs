use crate::data::Sample;

/// Failure surfaced by a storage client.
///
/// The queue manager treats every failure uniformly: the batch is logged,
/// counted, and dropped.
pub type StorageError = Box<dyn std::error::Error + Send + Sync>;

/// A downstream sink for batches of samples.
///
/// Implementations are called concurrently from every shard worker.
/// Returning from `store` means the batch has been handed off to the
/// downstream; durability is the downstream's concern.  A failed batch is
/// never retried.
pub trait StorageClient: Send + Sync {
    /// Stores the given samples in the remote storage.
    fn store(&self, samples: &[Sample]) -> Result<(), StorageError>;

    /// Identifies the remote storage implementation.  Used as the `type`
    /// label on every queue metric.
    fn name(&self) -> &str;
}
