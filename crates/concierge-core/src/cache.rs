//! Request-scoped store for grading outcomes.
//!
//! Each request id moves through `absent -> pending -> ready` and back to
//! `absent` on the first successful read. Every operation takes the same
//! lock, so a read of a ready entry and its removal happen as one step.
//!
//! Entries that are written but never polled stay until the process exits.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::types::{EvaluationStatus, GradingReport, RequestId};

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(GradingReport),
}

/// Shared store of grading results, read at most once per request.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<RequestId, Slot>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the pending placeholder for a request.
    ///
    /// Returns false, leaving the entry untouched, when the id is already known.
    pub fn put_pending(&self, id: RequestId) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Slot::Pending);
        true
    }

    /// Store the finished report, replacing the placeholder.
    pub fn complete(&self, id: RequestId, report: GradingReport) {
        let previous = self.entries.lock().insert(id, Slot::Ready(report));
        if previous.is_none() {
            tracing::debug!(request_id = %id, "Grading completed without a pending placeholder");
        }
    }

    /// Read the status for a request, consuming it if ready.
    pub fn poll(&self, id: RequestId) -> EvaluationStatus {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            None => EvaluationStatus::Unknown,
            Some(Slot::Pending) => EvaluationStatus::Pending,
            Some(Slot::Ready(_)) => match entries.remove(&id) {
                Some(Slot::Ready(report)) => EvaluationStatus::Ready(report),
                _ => EvaluationStatus::Unknown,
            },
        }
    }

    /// Total tracked entries, pending and ready.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Pending))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::MitigationOutcome;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn report(id: RequestId) -> GradingReport {
        GradingReport::failed(id, "judge unreachable", MitigationOutcome::default(), Utc::now())
    }

    #[test]
    fn test_unknown_id_is_absent() {
        let cache = ResultCache::new();
        assert!(cache.poll(RequestId::new()).is_unknown());
    }

    #[test]
    fn test_pending_is_not_consumed() {
        let cache = ResultCache::new();
        let id = RequestId::new();

        assert!(cache.put_pending(id));
        assert!(cache.poll(id).is_pending());
        assert!(cache.poll(id).is_pending());
        assert_eq!(cache.pending_count(), 1);
    }

    #[test]
    fn test_ready_is_read_once() {
        let cache = ResultCache::new();
        let id = RequestId::new();

        cache.put_pending(id);
        cache.complete(id, report(id));

        let first = cache.poll(id);
        assert!(first.is_ready());
        assert_eq!(first.into_report().unwrap().request_id, id);

        assert!(cache.poll(id).is_unknown());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_pending_does_not_clobber_ready() {
        let cache = ResultCache::new();
        let id = RequestId::new();

        cache.complete(id, report(id));
        assert!(!cache.put_pending(id));
        assert!(cache.poll(id).is_ready());
    }

    #[test]
    fn test_concurrent_readers_see_ready_once() {
        let cache = Arc::new(ResultCache::new());
        let id = RequestId::new();
        cache.put_pending(id);
        cache.complete(id, report(id));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.poll(id).is_ready())
            })
            .collect();

        let ready_reads = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ready| *ready)
            .count();

        assert_eq!(ready_reads, 1);
    }

    proptest! {
        #[test]
        fn prop_ready_entries_are_consumed(extra_polls in 1usize..6) {
            let cache = ResultCache::new();
            let id = RequestId::new();
            cache.put_pending(id);
            cache.complete(id, report(id));

            prop_assert!(cache.poll(id).is_ready());
            for _ in 0..extra_polls {
                prop_assert!(cache.poll(id).is_unknown());
            }
        }
    }
}
