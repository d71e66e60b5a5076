//! # Labels: opaque operation identities and result paths.
//!
//! A [`Label`] names a context or a supervised operation. It is used in two places:
//! - **Diagnostics**: error entries and waiting snapshots carry the label of the
//!   operation that produced them.
//! - **Result paths**: a durable operation's value is written into the context's
//!   result mapping at the label's path, one nested object per segment.
//!
//! ## Building labels
//! ```text
//! "server"              → ["server"]
//! "p.1"                 → ["p", "1"]          (dotted strings split on '.')
//! ["p", "1"]            → ["p", "1"]
//! Label::new("p").child(1) → ["p", "1"]
//! ```
//!
//! ## Example
//! ```rust
//! use ctxvisor::Label;
//!
//! let label = Label::new("listeners").child(8080);
//! assert_eq!(label.to_string(), "listeners.8080");
//! assert_eq!(label.segments().len(), 2);
//! assert_eq!(Label::from("a.b"), Label::from(["a", "b"]));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Ordered list of path segments identifying a context or an operation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    segments: Arc<[Arc<str>]>,
}

impl Label {
    /// Creates a single-segment label (no splitting on `.`).
    pub fn new(segment: impl fmt::Display) -> Self {
        Self {
            segments: Arc::from(vec![Arc::from(segment.to_string())]),
        }
    }

    /// Returns a new label with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let mut segments: Vec<Arc<str>> = self.segments.iter().cloned().collect();
        segments.push(Arc::from(segment.to_string()));
        Self {
            segments: Arc::from(segments),
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[Arc<str>] {
        &self.segments
    }

    /// Writes `value` into `root` at this label's path.
    ///
    /// Intermediate levels are created as objects; a non-object found on the way
    /// is replaced by an object.
    pub(crate) fn insert_into(&self, root: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };

        let mut level = root;
        for segment in parents {
            let slot = level
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            level = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        level.insert(last.to_string(), value);
    }

    fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments: Vec<Arc<str>> = segments
            .into_iter()
            .map(|s| Arc::from(s.as_ref()))
            .collect();
        // A label always has at least one segment; an empty one is `""`.
        if segments.is_empty() {
            segments.push(Arc::from(""));
        }
        Self {
            segments: Arc::from(segments),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::from_segments(value.split('.'))
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&Label> for Label {
    fn from(value: &Label) -> Self {
        value.clone()
    }
}

impl<const N: usize> From<[&str; N]> for Label {
    fn from(value: [&str; N]) -> Self {
        Self::from_segments(value)
    }
}

impl From<Vec<String>> for Label {
    fn from(value: Vec<String>) -> Self {
        Self::from_segments(value)
    }
}

impl From<(&str, u64)> for Label {
    fn from((name, index): (&str, u64)) -> Self {
        Label::new(name).child(index)
    }
}

impl From<Label> for Arc<str> {
    fn from(value: Label) -> Self {
        Arc::from(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_string_splits_into_segments() {
        let label = Label::from("a.b.c");
        assert_eq!(label.segments().len(), 3);
        assert_eq!(label.to_string(), "a.b.c");
    }

    #[test]
    fn test_tuple_and_child_agree() {
        assert_eq!(Label::from(("p", 1)), Label::new("p").child(1));
        assert_eq!(Label::from(("p", 1)), Label::from("p.1"));
    }

    #[test]
    fn test_insert_creates_nested_levels() {
        let mut root = Map::new();
        Label::from(("p", 1)).insert_into(&mut root, json!(1));
        Label::from(("p", 2)).insert_into(&mut root, json!(2));
        Label::from("flat").insert_into(&mut root, json!("x"));

        assert_eq!(
            Value::Object(root),
            json!({ "p": { "1": 1, "2": 2 }, "flat": "x" })
        );
    }

    #[test]
    fn test_empty_label_does_not_clobber_results() {
        let empty = Label::from(Vec::<String>::new());
        assert_eq!(empty, Label::from(""));
        assert_eq!(empty.segments().len(), 1);

        let mut root = Map::new();
        Label::from("kept").insert_into(&mut root, json!(1));
        empty.insert_into(&mut root, json!({ "other": 2 }));
        assert_eq!(
            Value::Object(root),
            json!({ "kept": 1, "": { "other": 2 } })
        );
    }

    #[test]
    fn test_insert_replaces_scalar_intermediate() {
        let mut root = Map::new();
        Label::from("a").insert_into(&mut root, json!(5));
        Label::from("a.b").insert_into(&mut root, json!(6));
        assert_eq!(Value::Object(root), json!({ "a": { "b": 6 } }));
    }
}
