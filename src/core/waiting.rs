//! # Waiting set: in-flight operation records of one context.
//!
//! Every guarded invocation and every child context occupies one
//! [`OperationRecord`] while it is in flight. A context cannot complete while
//! its waiting set is non-empty (unless it is scrammed).
//!
//! Records are keyed by [`RecordId`]; ids come from a process-wide counter so
//! iteration order is registration order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{Durability, Waiting};
use crate::label::Label;

static RECORD_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of one in-flight operation; used only to remove it on settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RecordId(u64);

impl RecordId {
    pub(crate) fn next() -> Self {
        RecordId(RECORD_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// One in-flight operation.
#[derive(Debug, Clone)]
pub(crate) struct OperationRecord {
    pub(crate) label: Label,
    pub(crate) kind: Durability,
}

/// Ordered collection of in-flight operations.
#[derive(Debug, Default)]
pub(crate) struct WaitingSet {
    records: BTreeMap<RecordId, OperationRecord>,
}

impl WaitingSet {
    pub(crate) fn insert(&mut self, id: RecordId, record: OperationRecord) {
        self.records.insert(id, record);
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<OperationRecord> {
        self.records.remove(&id)
    }

    pub(crate) fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<RecordId> {
        self.records.keys().copied().collect()
    }

    /// Diagnostic snapshot in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Waiting> {
        self.records
            .values()
            .map(|r| Waiting {
                label: r.label.clone(),
                kind: r.kind,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_follows_registration_order() {
        let mut set = WaitingSet::default();
        let a = RecordId::next();
        let b = RecordId::next();
        set.insert(
            b,
            OperationRecord {
                label: Label::from("second"),
                kind: Durability::Ephemeral,
            },
        );
        set.insert(
            a,
            OperationRecord {
                label: Label::from("first"),
                kind: Durability::Durable,
            },
        );

        let labels: Vec<String> = set.snapshot().iter().map(|w| w.label.to_string()).collect();
        assert_eq!(labels, vec!["first", "second"]);

        assert!(set.remove(a).is_some());
        assert!(!set.contains(a));
        assert!(set.remove(a).is_none());
        assert!(!set.is_empty());
    }
}
