mod exemplar;
mod labels;

pub use self::{
    exemplar::Exemplar,
    labels::{Label, Labels},
};

/// A measurement bound for remote storage.
///
/// Samples are the decoupled way of submitting data into the egress queue: a
/// producer owns a sample until it is accepted into a shard, after which the
/// shard's worker owns it until delivery (or until it is dropped at shutdown).
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub metric: Labels,
    pub value: f64,
    /// Timestamp in milliseconds.
    pub timestamp: i64,
}

impl Sample {
    pub fn new(metric: Labels, value: f64, timestamp: i64) -> Sample {
        Sample {
            metric,
            value,
            timestamp,
        }
    }
}
