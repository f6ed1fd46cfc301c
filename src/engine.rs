use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::clusters::{ErrorClusterer, MistakeBucket};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{BetaPosterior, UserModel};
use crate::registry::{TestEntry, TestRegistry};
use crate::types::{
    NextAction, ObservationRecord, ScreeningOutcome, SelectedStimulus, SessionStatus,
    StimulusDefinition, UserSnapshot, GLOBAL_SUBSKILL,
};

/// How many of the globally top-ranked mistake buckets are scanned when
/// looking for a hot cluster on the target sub-skill.
pub const HOT_CLUSTER_SCAN: usize = 5;

const FATIGUE_PENALTY_WEIGHT: f64 = 0.2;
const MIXED_HIGH: f64 = 0.8;
const MIXED_LOW: f64 = 0.5;
const PROFESSIONAL_CHECK_BELOW: f64 = 0.4;

struct Candidate<'a> {
    test_id: &'a str,
    entry: &'a TestEntry,
    stimulus: &'a StimulusDefinition,
}

/// Online item-selection engine.
///
/// All operations take `&self`. Each user's model sits behind its own mutex,
/// so concurrent calls for one user are serialised while different users
/// proceed independently.
pub struct AdaptiveEngine {
    config: EngineConfig,
    registry: RwLock<TestRegistry>,
    users: RwLock<HashMap<String, Arc<Mutex<UserModel>>>>,
    clusters: Mutex<ErrorClusterer>,
}

impl AdaptiveEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: EngineConfig) -> Self {
        let clusters = ErrorClusterer::new(config.difficulty_bucket_size);
        Self {
            config,
            registry: RwLock::new(TestRegistry::new()),
            users: RwLock::new(HashMap::new()),
            clusters: Mutex::new(clusters),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_test(&self, test_id: &str, stimuli: Vec<StimulusDefinition>) {
        let count = stimuli.len();
        let stored = self.registry.write().register(test_id, stimuli);
        if stored {
            tracing::info!(test_id = %test_id, stimuli = count, "test registered");
        } else {
            tracing::warn!(test_id = %test_id, "ignoring test registration with no stimuli");
        }
    }

    pub fn registered_tests(&self) -> Vec<String> {
        self.registry.read().test_ids().to_vec()
    }

    /// Folds one response into the user's model and the shared error clusters.
    ///
    /// Each record must be ingested exactly once; a replay is counted again.
    pub fn ingest_observation(&self, record: &ObservationRecord) -> UserSnapshot {
        let handle = self.user_handle(&record.user_id);
        let snapshot = {
            let mut model = handle.lock();
            model.apply(record, &self.config);
            model.snapshot()
        };

        if !record.response.correct {
            self.clusters.lock().add(
                record.subskill_key(),
                record.stimulus_metadata.difficulty,
                record.response.response_time_ms,
            );
        }

        tracing::debug!(
            user_id = %record.user_id,
            session_id = %record.session_id,
            test_id = %record.test_id,
            stimulus_id = %record.stimulus_id,
            subskill = %record.subskill_key(),
            correct = record.response.correct,
            fatigue = snapshot.fatigue,
            "observation ingested"
        );

        snapshot
    }

    /// Decides what to present next for `user_id`, restricted to
    /// `allowed_tests` when given.
    pub fn select_next_action(&self, user_id: &str, allowed_tests: Option<&[String]>) -> NextAction {
        let handle = self.user_handle(user_id);
        let (confidence_vector, uncertainty_score, fatigue, target, posterior) = {
            let model = handle.lock();
            let target = model
                .target_subskill()
                .unwrap_or(GLOBAL_SUBSKILL)
                .to_string();
            let posterior = model
                .subskills
                .get(&target)
                .map(|state| state.posterior)
                .unwrap_or_else(|| {
                    BetaPosterior::new(self.config.prior_alpha, self.config.prior_beta)
                });
            (
                model.confidence_vector(),
                model.uncertainty(),
                model.fatigue,
                target,
                posterior,
            )
        };

        let converged = uncertainty_score < self.config.uncertainty_stop;
        let session_status = if fatigue > self.config.fatigue_stop {
            SessionStatus::Stop
        } else if converged {
            SessionStatus::Inconclusive
        } else {
            SessionStatus::Continue
        };

        let next_action = {
            let registry = self.registry.read();
            let candidates = self.build_candidates(&registry, allowed_tests, &target);
            self.rank(&candidates, posterior, fatigue)
                .map(|(candidate, score)| SelectedStimulus {
                    test_id: candidate.test_id.to_string(),
                    stimulus: candidate.stimulus.clone(),
                    target_subskill: target.clone(),
                    score,
                })
        };

        let screening_outcome = if converged {
            ScreeningOutcome::Inconclusive
        } else {
            recommend(&confidence_vector, fatigue, self.config.fatigue_stop)
        };

        tracing::debug!(
            user_id = %user_id,
            target_subskill = %target,
            uncertainty = uncertainty_score,
            fatigue,
            session_status = session_status.as_str(),
            outcome = screening_outcome.as_str(),
            stimulus_id = next_action.as_ref().map(|a| a.stimulus.stimulus_id.as_str()),
            "next action selected"
        );

        NextAction {
            next_action,
            confidence_vector,
            uncertainty_score,
            session_status,
            screening_outcome,
        }
    }

    /// Current model view for `user_id`; does not create unknown users.
    pub fn user_snapshot(&self, user_id: &str) -> Option<UserSnapshot> {
        let handle = self.users.read().get(user_id).cloned()?;
        let model = handle.lock();
        Some(model.snapshot())
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    pub fn top_mistake_buckets(&self, limit: usize) -> Vec<MistakeBucket> {
        self.clusters.lock().top_mistake_buckets(limit)
    }

    fn user_handle(&self, user_id: &str) -> Arc<Mutex<UserModel>> {
        if let Some(handle) = self.users.read().get(user_id) {
            return Arc::clone(handle);
        }
        let mut users = self.users.write();
        let handle = users.entry(user_id.to_string()).or_insert_with(|| {
            tracing::debug!(user_id = %user_id, "user model created");
            Arc::new(Mutex::new(UserModel::new(user_id)))
        });
        Arc::clone(handle)
    }

    fn build_candidates<'a>(
        &self,
        registry: &'a TestRegistry,
        allowed_tests: Option<&'a [String]>,
        target: &str,
    ) -> Vec<Candidate<'a>> {
        let all: Vec<Candidate<'a>> = registry
            .iter_allowed(allowed_tests)
            .flat_map(|(test_id, entry)| {
                entry.stimuli.iter().map(move |stimulus| Candidate {
                    test_id,
                    entry,
                    stimulus,
                })
            })
            .collect();

        // Untagged stimuli are eligible for any target.
        let matches = |c: &Candidate<'_>| c.stimulus.subskill.as_deref().map_or(true, |s| s == target);
        if all.iter().any(matches) {
            return all.into_iter().filter(|c| matches(c)).collect();
        }

        let mut fallback = all;
        let hot = self
            .clusters
            .lock()
            .top_mistake_buckets(HOT_CLUSTER_SCAN)
            .into_iter()
            .find(|bucket| bucket.subskill == target);
        if let Some(bucket) = hot {
            let zone = bucket.bucket as f64 * self.config.difficulty_bucket_size;
            fallback.sort_by(|a, b| {
                let da = (a.stimulus.difficulty - zone).abs();
                let db = (b.stimulus.difficulty - zone).abs();
                da.total_cmp(&db)
            });
        }
        fallback
    }

    /// Highest `info_gain + exploration - fatigue_penalty`; the first
    /// candidate wins ties.
    fn rank<'a, 'c>(
        &self,
        candidates: &'c [Candidate<'a>],
        posterior: BetaPosterior,
        fatigue: f64,
    ) -> Option<(&'c Candidate<'a>, f64)> {
        let ability = posterior.mean();
        let exploration = self.config.exploration_weight * posterior.variance().sqrt();
        let fatigue_penalty = fatigue * FATIGUE_PENALTY_WEIGHT;

        let mut best: Option<(&'c Candidate<'a>, f64)> = None;
        for candidate in candidates {
            let normalized = candidate.entry.normalized(candidate.stimulus.difficulty);
            let gap = (normalized - ability).abs();
            let info_gain = 1.0 - (gap * gap).tanh();
            let score = info_gain + exploration - fatigue_penalty;
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }
        best
    }
}

impl Default for AdaptiveEngine {
    fn default() -> Self {
        Self::with_valid_config(EngineConfig::default())
    }
}

/// Outcome to report once the estimate has not yet converged.
pub fn recommend(
    confidence: &BTreeMap<String, f64>,
    fatigue: f64,
    fatigue_stop: f64,
) -> ScreeningOutcome {
    let mixed = confidence.values().any(|&m| m > MIXED_HIGH)
        && confidence.values().any(|&m| m < MIXED_LOW);
    if fatigue > fatigue_stop || mixed {
        ScreeningOutcome::Inconclusive
    } else if confidence.values().any(|&m| m < PROFESSIONAL_CHECK_BELOW) {
        ScreeningOutcome::RecommendProfessionalCheck
    } else {
        ScreeningOutcome::Normal
    }
}
