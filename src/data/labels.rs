use fnv::FnvHasher;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{
    fmt::{self, Display},
    hash::Hasher,
    slice,
};

/// A single name/value pair.
#[derive(Clone, Hash, PartialEq, Eq, Debug)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Label {
        Label {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The identity of a time series: a set of name/value pairs held in
/// name-sorted order.
///
/// Equality is structural.  The canonical string encoding doubles as the
/// per-series index key in exemplar storage, and the fingerprint drives shard
/// selection in the egress queue.
#[derive(Clone, Hash, PartialEq, Eq, Debug, Default)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Creates a label set from the given labels, sorting them by name.
    pub fn new(mut labels: Vec<Label>) -> Labels {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Labels(labels)
    }

    /// Creates a label set from name/value string pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Labels {
        Labels::new(pairs.iter().map(|(n, v)| Label::new(*n, *v)).collect())
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> slice::Iter<'_, Label> { self.0.iter() }

    /// Canonical string encoding: `{name="value", ...}` in name-sorted order.
    ///
    /// Backslashes, quotes, and newlines in values are escaped, so two label
    /// sets share an encoding only when they are structurally equal.
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(2 + 16 * self.0.len());
        out.push('{');
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&label.name);
            out.push_str("=\"");
            for c in label.value.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        out.push('}');
        out
    }

    /// A fast 64-bit fingerprint over the sorted pairs.
    ///
    /// Names and values are fed through FNV-1a with a separator byte that
    /// cannot appear in UTF-8 text, so `{a="bc"}` and `{ab="c"}` hash apart.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        for label in &self.0 {
            hasher.write(label.name.as_bytes());
            hasher.write(&[0xff]);
            hasher.write(label.value.as_bytes());
            hasher.write(&[0xff]);
        }
        hasher.finish()
    }
}

impl Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.canonical()) }
}

impl Serialize for Labels {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for label in &self.0 {
            map.serialize_entry(&label.name, &label.value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::Labels;

    #[test]
    fn test_canonical_sorts_by_name() {
        let labels = Labels::from_pairs(&[("service", "api"), ("__name__", "requests_total")]);
        assert_eq!(labels.canonical(), "{__name__=\"requests_total\", service=\"api\"}");
    }

    #[test]
    fn test_canonical_escapes_values() {
        let labels = Labels::from_pairs(&[("path", "C:\\temp\n\"x\"")]);
        assert_eq!(labels.canonical(), "{path=\"C:\\\\temp\\n\\\"x\\\"\"}");
    }

    #[test]
    fn test_equality_ignores_input_order() {
        let a = Labels::from_pairs(&[("a", "1"), ("b", "2")]);
        let b = Labels::from_pairs(&[("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_respects_pair_boundaries() {
        let a = Labels::from_pairs(&[("a", "bc")]);
        let b = Labels::from_pairs(&[("ab", "c")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_across_series() {
        let a = Labels::from_pairs(&[("service", "asdf")]);
        let b = Labels::from_pairs(&[("service", "qwer")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_display_matches_canonical() {
        let labels = Labels::from_pairs(&[("service", "asdf")]);
        assert_eq!(format!("{}", labels), labels.canonical());
    }
}
