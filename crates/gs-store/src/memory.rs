use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gs_types::{Configuration, EvaluationResult, GsResult, StoreError};

use crate::{check_record, ResultStore};

/// In-process result store keyed by canonical configuration.
///
/// Not durable: contents vanish with the process. Useful for tests and for
/// one-off sweeps that only need the best result.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    rows: DashMap<String, EvaluationResult>,
    next_id: AtomicI64,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn ensure_schema(&self) -> GsResult<()> {
        Ok(())
    }

    fn load_evaluated_keys(&self) -> GsResult<HashSet<String>> {
        Ok(self.rows.iter().map(|entry| entry.key().clone()).collect())
    }

    fn record(&self, configuration: &Configuration, score: f64) -> GsResult<EvaluationResult> {
        check_record(configuration, score)?;
        let key = configuration.canonical_key();

        // The entry guard holds the shard lock, so check and insert are atomic.
        match self.rows.entry(key) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateKey {
                key: entry.key().clone(),
            }
            .into()),
            Entry::Vacant(entry) => {
                let result = EvaluationResult {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    configuration: configuration.clone(),
                    score,
                    recorded_at: Utc::now(),
                };
                entry.insert(result.clone());
                Ok(result)
            }
        }
    }

    fn best_result(&self) -> GsResult<EvaluationResult> {
        let mut best: Option<EvaluationResult> = None;
        for entry in self.rows.iter() {
            let candidate = entry.value();
            if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                best = Some(candidate.clone());
            }
        }
        best.ok_or_else(|| StoreError::EmptyStore.into())
    }

    fn count(&self) -> GsResult<usize> {
        Ok(self.rows.len())
    }

    fn results(&self) -> GsResult<Vec<EvaluationResult>> {
        let mut results: Vec<EvaluationResult> =
            self.rows.iter().map(|entry| entry.value().clone()).collect();
        results.sort_by_key(|r| r.id);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_types::GsError;

    fn config(c: f64) -> Configuration {
        Configuration::new().with("C", c).with("kernel", "linear")
    }

    #[test]
    fn record_is_at_most_once_per_key() {
        let store = MemoryResultStore::new();
        store.record(&config(0.1), 0.9).unwrap();

        let err = store.record(&config(0.1), 0.5).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.best_result().unwrap().score, 0.9);
    }

    #[test]
    fn empty_store_has_no_best() {
        let store = MemoryResultStore::new();
        assert!(store.best_result().unwrap_err().is_empty_store());
    }

    #[test]
    fn best_result_breaks_ties_by_insertion() {
        let store = MemoryResultStore::new();
        store.record(&config(1.0), 0.8).unwrap();
        let first_max = store.record(&config(10.0), 0.95).unwrap();
        store.record(&config(100.0), 0.95).unwrap();

        let best = store.best_result().unwrap();
        assert_eq!(best.id, first_max.id);
        assert_eq!(best.configuration, config(10.0));
    }

    #[test]
    fn non_finite_records_are_refused() {
        let store = MemoryResultStore::new();
        for score in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.record(&config(0.1), score).unwrap_err();
            assert!(matches!(err, GsError::Validation(_)));
        }
        assert!(store.record(&config(f64::NAN), 0.5).is_err());
        assert_eq!(store.count().unwrap(), 0);

        store.record(&config(1.0), 0.9).unwrap();
        assert_eq!(store.best_result().unwrap().score, 0.9);
    }

    #[test]
    fn keys_and_results_reflect_records() {
        let store = MemoryResultStore::new();
        store.record(&config(0.1), 0.7).unwrap();
        store.record(&config(1.0), 0.8).unwrap();

        let keys = store.load_evaluated_keys().unwrap();
        assert!(keys.contains(&config(0.1).canonical_key()));
        assert!(keys.contains(&config(1.0).canonical_key()));

        let results = store.results().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].id < results[1].id);
    }
}
