use crate::data::Labels;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// An auxiliary annotation attached to a time series sample, typically a
/// trace identifier plus the observed value and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar {
    pub labels: Labels,
    pub value: f64,
    /// Timestamp in milliseconds.
    pub ts: i64,
    /// Whether the exemplar carried its own timestamp.  When `false`, the
    /// timestamp was inherited from the enclosing scrape and is ignored for
    /// equality.
    pub has_ts: bool,
}

impl Exemplar {
    /// Creates an exemplar carrying its own timestamp.
    pub fn new(labels: Labels, value: f64, ts: i64) -> Exemplar {
        Exemplar {
            labels,
            value,
            ts,
            has_ts: true,
        }
    }

    /// Domain equality: the label sets match, the values are bitwise equal,
    /// and the timestamps match unless neither exemplar carries its own.
    ///
    /// The same exemplar scraped twice without an exported timestamp gets a
    /// different scrape timestamp each time; ignoring the timestamp when both
    /// sides inherited theirs keeps it a duplicate of itself.
    pub fn equals(&self, other: &Exemplar) -> bool {
        if self.labels != other.labels {
            return false;
        }
        if (self.has_ts || other.has_ts) && self.ts != other.ts {
            return false;
        }
        self.value.to_bits() == other.value.to_bits()
    }
}

impl Serialize for Exemplar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Exemplar", 3)?;
        state.serialize_field("labels", &self.labels)?;
        state.serialize_field("value", &self.value)?;
        // Timestamps go out in float seconds.
        state.serialize_field("timestamp", &(self.ts as f64 / 1000.0))?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::Exemplar;
    use crate::data::Labels;

    fn trace(id: &str) -> Labels { Labels::from_pairs(&[("trace_id", id)]) }

    #[test]
    fn test_equals_with_own_timestamps() {
        let a = Exemplar::new(trace("qwerty"), 0.1, 101);
        let b = Exemplar::new(trace("qwerty"), 0.1, 101);
        let c = Exemplar::new(trace("qwerty"), 0.1, 102);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_equals_ignores_inherited_timestamps() {
        let a = Exemplar {
            labels: trace("qwerty"),
            value: 0.1,
            ts: 101,
            has_ts: false,
        };
        let b = Exemplar {
            labels: trace("qwerty"),
            value: 0.1,
            ts: 999,
            has_ts: false,
        };
        assert!(a.equals(&b));

        // One side carrying its own timestamp reinstates the comparison.
        let c = Exemplar::new(trace("qwerty"), 0.1, 999);
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_equals_compares_values_bitwise() {
        let a = Exemplar::new(trace("qwerty"), 0.0, 101);
        let b = Exemplar::new(trace("qwerty"), -0.0, 101);
        assert!(!a.equals(&b));

        let c = Exemplar::new(trace("qwerty"), f64::NAN, 101);
        let d = Exemplar::new(trace("qwerty"), f64::NAN, 101);
        assert!(c.equals(&d));
    }

    #[test]
    fn test_equals_compares_labels() {
        let a = Exemplar::new(trace("qwerty"), 0.1, 101);
        let b = Exemplar::new(trace("zxcvb"), 0.1, 101);
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_serialize_json_shape() {
        let e = Exemplar::new(trace("abc"), 0.25, 1500);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["labels"]["trace_id"], "abc");
        assert_eq!(json["value"], 0.25);
        assert_eq!(json["timestamp"], 1.5);
    }
}
