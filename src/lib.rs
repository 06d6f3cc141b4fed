mod client;
mod configuration;
mod data;
mod instrument;
mod queue;
mod store;

pub use self::{
    client::{StorageClient, StorageError},
    configuration::Configuration,
    data::{Exemplar, Label, Labels, Sample},
    instrument::{Counter, Gauge, Registry, Snapshot, Summary},
    queue::ShardedQueueManager,
    store::{CircularExemplarStore, ExemplarError},
};
