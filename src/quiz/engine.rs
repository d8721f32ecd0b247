use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::quiz::countries::CountryDataset;
use crate::quiz::error::{QuizError, QuizResult};
use crate::quiz::storage::RunStore;
use crate::quiz::{Answer, Mode, Rules, Run, RunId, Verdict};

/// A judged answer together with the run it left behind.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SubmitOutcome {
    pub run: Run,
    pub correct: bool,
    pub points: u32,
    pub distance_km: Option<f64>,
}

impl SubmitOutcome {
    fn new(run: Run, verdict: Verdict) -> Self {
        Self {
            run,
            correct: verdict.correct,
            points: verdict.points,
            distance_km: verdict.distance_km,
        }
    }
}

/// Entry point for collaborators: starts runs, fetches them and applies answers.
///
/// Every submission holds the run's own lock across load, transition and
/// save, so two answers for one run never interleave. Different runs only
/// share the read-only dataset.
pub struct QuizEngine {
    dataset: Arc<CountryDataset>,
    store: Arc<dyn RunStore>,
    rules: Rules,
    rng: Mutex<StdRng>,
    locks: Mutex<HashMap<RunId, Arc<Mutex<()>>>>,
}

impl QuizEngine {
    pub fn new(dataset: Arc<CountryDataset>, store: Arc<dyn RunStore>, rules: Rules) -> Self {
        Self::with_rng(dataset, store, rules, StdRng::from_entropy())
    }

    /// Deterministic engine for tests and replays.
    pub fn with_seed(
        dataset: Arc<CountryDataset>,
        store: Arc<dyn RunStore>,
        rules: Rules,
        seed: u64,
    ) -> Self {
        Self::with_rng(dataset, store, rules, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        dataset: Arc<CountryDataset>,
        store: Arc<dyn RunStore>,
        rules: Rules,
        rng: StdRng,
    ) -> Self {
        Self {
            dataset,
            store,
            rules,
            rng: Mutex::new(rng),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dataset(&self) -> &CountryDataset {
        &self.dataset
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn start_run(&self, mode: Mode) -> QuizResult<Run> {
        let run = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            Run::start(mode, &self.rules, &self.dataset, &mut *rng)?
        };
        self.store.save(&run)?;

        info!("Started {} run {}", mode, run.id);
        Ok(run)
    }

    pub fn get_run(&self, id: RunId) -> QuizResult<Run> {
        self.store.load(&id)?.ok_or(QuizError::NotFound(id))
    }

    pub fn submit_answer(&self, id: RunId, answer: &Answer) -> QuizResult<SubmitOutcome> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut run) = self.store.load(&id)? else {
            self.forget(&id);
            return Err(QuizError::NotFound(id));
        };

        let verdict = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            run.submit(answer, &self.rules, &self.dataset, &mut *rng)?
        };
        self.store.save(&run)?;

        if !run.is_active() {
            info!("Run {} ended with {} points", run.id, run.score);
        }
        Ok(SubmitOutcome::new(run, verdict))
    }

    pub fn submit_country_click(&self, id: RunId, iso3: &str) -> QuizResult<SubmitOutcome> {
        self.submit_answer(
            id,
            &Answer::CountryClick {
                iso3: iso3.to_string(),
            },
        )
    }

    pub fn submit_capital_country(&self, id: RunId, iso3: &str) -> QuizResult<SubmitOutcome> {
        self.submit_answer(
            id,
            &Answer::CapitalCountry {
                iso3: iso3.to_string(),
            },
        )
    }

    pub fn submit_capital_click(&self, id: RunId, lat: f64, lng: f64) -> QuizResult<SubmitOutcome> {
        self.submit_answer(id, &Answer::CapitalClick { lat, lng })
    }

    pub fn submit_population_order(
        &self,
        id: RunId,
        ordered: &[String],
    ) -> QuizResult<SubmitOutcome> {
        self.submit_answer(
            id,
            &Answer::PopulationOrder {
                ordered: ordered.to_vec(),
            },
        )
    }

    /// Removes a run, e.g. when its player abandons it.
    pub fn discard_run(&self, id: RunId) -> QuizResult<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.store.delete(&id)?;
        self.forget(&id);
        Ok(())
    }

    /// Evicts idle runs from the store along with their locks.
    ///
    /// A run whose lock is held or about to be taken is kept. The lock map
    /// stays locked throughout, so no submission can pick up the lock of a
    /// run while it is being evicted.
    pub fn evict_idle(&self, ttl: Duration) -> QuizResult<usize> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let in_use = |id: &RunId| {
            locks
                .get(id)
                .is_some_and(|lock| Arc::strong_count(lock) > 1)
        };

        let evicted = self.store.evict_idle(ttl, &in_use)?;
        for id in &evicted {
            locks.remove(id);
        }
        drop(locks);

        if !evicted.is_empty() {
            debug!("Evicted {} idle runs", evicted.len());
        }
        Ok(evicted.len())
    }

    fn lock_for(&self, id: RunId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    fn forget(&self, id: &RunId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(id);
    }
}
