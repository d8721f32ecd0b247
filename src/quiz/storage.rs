use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::quiz::error::QuizResult;
use crate::quiz::{Run, RunId};

/// Where runs live between answers.
///
/// The engine serializes access per run, so implementations only need
/// each call to be atomic on its own.
pub trait RunStore: Send + Sync {
    fn load(&self, id: &RunId) -> QuizResult<Option<Run>>;

    fn save(&self, run: &Run) -> QuizResult<()>;

    fn delete(&self, id: &RunId) -> QuizResult<()>;

    /// Drops runs nobody touched for `ttl`, except those `keep` holds on to,
    /// and returns their ids. Stores that expire entries on their own can
    /// keep the default.
    fn evict_idle(
        &self,
        _ttl: Duration,
        _keep: &dyn Fn(&RunId) -> bool,
    ) -> QuizResult<Vec<RunId>> {
        Ok(Vec::new())
    }
}

struct StoredRun {
    run: Run,
    touched: Instant,
}

/// Process-local store, good for a single bot instance.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, StoredRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_older_than(
        &self,
        ttl: Duration,
        now: Instant,
        keep: &dyn Fn(&RunId) -> bool,
    ) -> Vec<RunId> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<RunId> = runs
            .iter()
            .filter(|(_, stored)| now.saturating_duration_since(stored.touched) > ttl)
            .filter(|(id, _)| !keep(id))
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            runs.remove(id);
        }
        expired
    }
}

impl RunStore for InMemoryRunStore {
    fn load(&self, id: &RunId) -> QuizResult<Option<Run>> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(runs.get(id).map(|stored| stored.run.clone()))
    }

    fn save(&self, run: &Run) -> QuizResult<()> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        runs.insert(
            run.id,
            StoredRun {
                run: run.clone(),
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, id: &RunId) -> QuizResult<()> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        runs.remove(id);
        Ok(())
    }

    fn evict_idle(
        &self,
        ttl: Duration,
        keep: &dyn Fn(&RunId) -> bool,
    ) -> QuizResult<Vec<RunId>> {
        Ok(self.evict_older_than(ttl, Instant::now(), keep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::countries::tests::small_dataset;
    use crate::quiz::{Mode, Rules};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run() -> Run {
        Run::start(
            Mode::FindOnGlobe,
            &Rules::default(),
            &small_dataset(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap()
    }

    #[test]
    fn save_load_delete() {
        let store = InMemoryRunStore::new();
        let run = run();

        assert!(store.load(&run.id).unwrap().is_none());
        store.save(&run).unwrap();
        assert_eq!(store.load(&run.id).unwrap(), Some(run.clone()));

        store.delete(&run.id).unwrap();
        assert!(store.load(&run.id).unwrap().is_none());
        // deleting twice is fine
        store.delete(&run.id).unwrap();
    }

    #[test]
    fn evicts_only_idle_runs() {
        let store = InMemoryRunStore::new();
        let stale = run();
        let fresh = run();
        store.save(&stale).unwrap();
        store.save(&fresh).unwrap();

        // Pretend two minutes pass and only `fresh` gets touched again
        let later = Instant::now() + Duration::from_secs(120);
        {
            let mut runs = store.runs.write().unwrap();
            runs.get_mut(&fresh.id).unwrap().touched = later;
        }

        let evicted = store.evict_older_than(Duration::from_secs(60), later, &|_| false);
        assert_eq!(evicted, vec![stale.id]);
        assert_eq!(store.len(), 1);
        assert!(store.load(&fresh.id).unwrap().is_some());
    }

    #[test]
    fn kept_runs_survive_eviction() {
        let store = InMemoryRunStore::new();
        let busy = run();
        let idle = run();
        store.save(&busy).unwrap();
        store.save(&idle).unwrap();

        let later = Instant::now() + Duration::from_secs(120);
        let evicted =
            store.evict_older_than(Duration::from_secs(60), later, &|id| *id == busy.id);
        assert_eq!(evicted, vec![idle.id]);
        assert_eq!(store.load(&busy.id).unwrap(), Some(busy));
    }
}
