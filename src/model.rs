use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::EngineConfig;
use crate::stats::{RollingWindow, RunningStats};
use crate::types::{ObservationRecord, SubskillSnapshot, TestSnapshot, UserSnapshot};

pub const ACCURACY_WINDOW: usize = 20;
pub const RESPONSE_TIME_WINDOW: usize = 20;
pub const ANSWER_CHANGE_WINDOW: usize = 20;

const SLOW_FACTOR: f64 = 1.3;
const ANOMALY_INCREMENT: f64 = 0.5;
const BASELINE_INCREMENT: f64 = 0.1;
const TARGET_FATIGUE_WEIGHT: f64 = 0.2;

/// Beta-Bernoulli belief about accuracy on one sub-skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaPosterior {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    pub fn observe(&mut self, correct: bool) {
        if correct {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }

    pub fn mean(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total <= 0.0 {
            return 0.5;
        }
        self.alpha / total
    }

    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total <= 0.0 {
            return 0.25;
        }
        self.alpha * self.beta / (total * total * (total + 1.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubskillState {
    pub posterior: BetaPosterior,
    pub time_stats: RunningStats,
    pub click_stats: RunningStats,
    pub answer_changes: RollingWindow,
    pub accuracy: RollingWindow,
    pub fatigue: f64,
    pub last_observation_ts: Option<i64>,
}

impl SubskillState {
    pub fn new(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            posterior: BetaPosterior::new(prior_alpha, prior_beta),
            time_stats: RunningStats::new(),
            click_stats: RunningStats::new(),
            answer_changes: RollingWindow::new(ANSWER_CHANGE_WINDOW),
            accuracy: RollingWindow::new(ACCURACY_WINDOW),
            fatigue: 0.0,
            last_observation_ts: None,
        }
    }

    /// Fatigue increment for a response, judged against this sub-skill's
    /// running time and click means. Called after the response has been
    /// folded into those means, so they are never empty here.
    fn fatigue_increment(&self, response_ms: f64, clicks: f64, gain: f64) -> f64 {
        let slow = response_ms > SLOW_FACTOR * self.time_stats.mean();
        let high_clicks = clicks > SLOW_FACTOR * self.click_stats.mean();
        if slow || high_clicks {
            ANOMALY_INCREMENT * gain
        } else {
            BASELINE_INCREMENT * gain
        }
    }

    pub fn snapshot(&self) -> SubskillSnapshot {
        SubskillSnapshot {
            mean: self.posterior.mean(),
            variance: self.posterior.variance(),
            fatigue: self.fatigue,
            observations: self.time_stats.count(),
            recent_accuracy: self.accuracy.mean(),
            answer_change_rate: self.answer_changes.mean(),
            mean_response_ms: self.time_stats.mean(),
            last_observation_ts: self.last_observation_ts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestState {
    pub accuracy: RollingWindow,
    pub response_times: RollingWindow,
    pub last_difficulty: Option<f64>,
    pub observations: usize,
}

impl TestState {
    pub fn new() -> Self {
        Self {
            accuracy: RollingWindow::new(ACCURACY_WINDOW),
            response_times: RollingWindow::new(RESPONSE_TIME_WINDOW),
            last_difficulty: None,
            observations: 0,
        }
    }

    pub fn snapshot(&self) -> TestSnapshot {
        TestSnapshot {
            observations: self.observations,
            recent_accuracy: self.accuracy.mean(),
            mean_response_ms: self.response_times.mean(),
            last_difficulty: self.last_difficulty,
        }
    }
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the engine knows about one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserModel {
    pub user_id: String,
    pub subskills: BTreeMap<String, SubskillState>,
    pub tests: HashMap<String, TestState>,
    pub interaction_time: RunningStats,
    pub fatigue: f64,
}

impl UserModel {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            subskills: BTreeMap::new(),
            tests: HashMap::new(),
            interaction_time: RunningStats::new(),
            fatigue: 0.0,
        }
    }

    /// Applies one observed response. Replaying a record counts it twice.
    pub fn apply(&mut self, record: &ObservationRecord, config: &EngineConfig) {
        let response = &record.response;
        let correct = if response.correct { 1.0 } else { 0.0 };
        let changed = if response.answer_changed { 1.0 } else { 0.0 };
        let clicks = f64::from(response.click_count);

        let subskill = self
            .subskills
            .entry(record.subskill_key().to_string())
            .or_insert_with(|| SubskillState::new(config.prior_alpha, config.prior_beta));
        let test = self.tests.entry(record.test_id.clone()).or_default();

        subskill.posterior.observe(response.correct);
        subskill.time_stats.add(response.response_time_ms);
        subskill.click_stats.add(clicks);

        subskill.accuracy.push(correct);
        test.accuracy.push(correct);
        test.response_times.push(response.response_time_ms);
        subskill.answer_changes.push(changed);
        test.last_difficulty = Some(record.stimulus_metadata.difficulty);
        test.observations += 1;

        let increment =
            subskill.fatigue_increment(response.response_time_ms, clicks, config.fatigue_gain);
        subskill.fatigue = subskill.fatigue * config.fatigue_decay + increment;
        subskill.last_observation_ts = Some(record.timestamp);

        // The hottest sub-skill sets the floor; user fatigue is not an average.
        self.fatigue = (self.fatigue * config.fatigue_decay).max(subskill.fatigue);

        self.interaction_time.add(response.response_time_ms);
    }

    /// Sub-skill most worth probing next: high variance, then high fatigue.
    pub fn target_subskill(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (key, state) in &self.subskills {
            let score = state.posterior.variance() + TARGET_FATIGUE_WEIGHT * state.fatigue;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((key.as_str(), score));
            }
        }
        best.map(|(key, _)| key)
    }

    /// Mean posterior variance, 1.0 when nothing has been observed.
    pub fn uncertainty(&self) -> f64 {
        if self.subskills.is_empty() {
            return 1.0;
        }
        self.subskills
            .values()
            .map(|s| s.posterior.variance())
            .sum::<f64>()
            / self.subskills.len() as f64
    }

    pub fn confidence_vector(&self) -> BTreeMap<String, f64> {
        self.subskills
            .iter()
            .map(|(key, state)| (key.clone(), state.posterior.mean()))
            .collect()
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            user_id: self.user_id.clone(),
            subskills: self
                .subskills
                .iter()
                .map(|(key, state)| (key.clone(), state.snapshot()))
                .collect(),
            tests: self
                .tests
                .iter()
                .map(|(key, state)| (key.clone(), state.snapshot()))
                .collect(),
            fatigue: self.fatigue,
            mean_interaction_ms: self.interaction_time.mean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResponseSignal, StimulusDefinition};

    fn record(subskill: Option<&str>, response: ResponseSignal) -> ObservationRecord {
        let mut stimulus = StimulusDefinition::new("s1", 0.5);
        if let Some(tag) = subskill {
            stimulus = stimulus.with_subskill(tag);
        }
        ObservationRecord::new("u1", "session", "t", &stimulus, response).at(1_700_000_000_000)
    }

    #[test]
    fn test_beta_moments() {
        let posterior = BetaPosterior::new(2.0, 3.0);
        assert!((posterior.mean() - 0.4).abs() < 1e-12);
        assert!((posterior.variance() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_beta_moments() {
        let posterior = BetaPosterior::new(0.0, 0.0);
        assert_eq!(posterior.mean(), 0.5);
        assert_eq!(posterior.variance(), 0.25);
    }

    #[test]
    fn test_untagged_record_lands_in_global() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        model.apply(&record(None, ResponseSignal::correct(800.0)), &config);

        let state = model.subskills.get(crate::types::GLOBAL_SUBSKILL).unwrap();
        assert_eq!(state.posterior, BetaPosterior::new(3.0, 2.0));
        assert_eq!(state.last_observation_ts, Some(1_700_000_000_000));
        assert_eq!(model.tests["t"].last_difficulty, Some(0.5));
    }

    #[test]
    fn test_first_observation_uses_baseline_increment() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        // The first response is its own baseline, so even a long, busy
        // response is not flagged.
        let response = ResponseSignal {
            click_count: 6,
            ..ResponseSignal::correct(5000.0)
        };
        model.apply(&record(Some("s"), response), &config);

        let expected = BASELINE_INCREMENT * config.fatigue_gain;
        assert!((model.subskills["s"].fatigue - expected).abs() < 1e-12);
        assert!((model.fatigue - expected).abs() < 1e-12);
    }

    #[test]
    fn test_click_spike_uses_anomaly_increment() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        model.apply(&record(Some("s"), ResponseSignal::correct(1000.0)), &config);
        let before = model.subskills["s"].fatigue;

        let busy = ResponseSignal {
            click_count: 10,
            ..ResponseSignal::correct(1000.0)
        };
        model.apply(&record(Some("s"), busy), &config);

        let expected = before * config.fatigue_decay + ANOMALY_INCREMENT * config.fatigue_gain;
        assert!((model.subskills["s"].fatigue - expected).abs() < 1e-12);
    }

    #[test]
    fn test_user_fatigue_tracks_hottest_subskill() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        model.apply(&record(Some("a"), ResponseSignal::correct(1000.0)), &config);
        model.apply(
            &record(
                Some("a"),
                ResponseSignal {
                    click_count: 8,
                    ..ResponseSignal::correct(1000.0)
                },
            ),
            &config,
        );
        let hot = model.subskills["a"].fatigue;
        model.apply(&record(Some("b"), ResponseSignal::correct(1000.0)), &config);

        assert!(model.subskills["b"].fatigue < hot);
        assert!((model.fatigue - hot * config.fatigue_decay).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_and_target_without_data() {
        let model = UserModel::new("fresh");
        assert_eq!(model.uncertainty(), 1.0);
        assert!(model.target_subskill().is_none());
        assert!(model.confidence_vector().is_empty());
    }

    #[test]
    fn test_target_prefers_uncertain_subskill() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        for _ in 0..10 {
            model.apply(&record(Some("settled"), ResponseSignal::correct(1000.0)), &config);
        }
        model.apply(&record(Some("fresh"), ResponseSignal::incorrect(1000.0)), &config);
        assert_eq!(model.target_subskill(), Some("fresh"));
    }

    #[test]
    fn test_windows_stay_bounded() {
        let config = EngineConfig::default();
        let mut model = UserModel::new("u1");
        for i in 0..50 {
            let response = if i % 2 == 0 {
                ResponseSignal::correct(900.0)
            } else {
                ResponseSignal::incorrect(900.0)
            };
            model.apply(&record(Some("s"), response), &config);
        }
        let state = &model.subskills["s"];
        assert_eq!(state.accuracy.len(), ACCURACY_WINDOW);
        assert_eq!(model.tests["t"].response_times.len(), RESPONSE_TIME_WINDOW);
        assert_eq!(model.tests["t"].observations, 50);
        assert!((state.accuracy.mean() - 0.5).abs() < 1e-12);
    }
}
