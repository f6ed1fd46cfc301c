use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sub-skill key used when a stimulus carries no explicit tag.
pub const GLOBAL_SUBSKILL: &str = "global";

/// Render-only payload attached to a stimulus. The engine never reads it.
pub type PresentationParams = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StimulusDefinition {
    pub stimulus_id: String,
    pub difficulty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subskill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_params: Option<PresentationParams>,
}

impl StimulusDefinition {
    pub fn new(stimulus_id: impl Into<String>, difficulty: f64) -> Self {
        Self {
            stimulus_id: stimulus_id.into(),
            difficulty,
            subskill: None,
            presentation_params: None,
        }
    }

    pub fn with_subskill(mut self, subskill: impl Into<String>) -> Self {
        self.subskill = Some(subskill.into());
        self
    }

    pub fn with_presentation(mut self, params: PresentationParams) -> Self {
        self.presentation_params = Some(params);
        self
    }

    /// Sub-skill key this stimulus contributes to.
    pub fn subskill_key(&self) -> &str {
        self.subskill.as_deref().unwrap_or(GLOBAL_SUBSKILL)
    }
}

/// Copy of the stimulus metadata taken when the observation was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StimulusMetadata {
    pub difficulty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subskill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_params: Option<PresentationParams>,
}

impl From<&StimulusDefinition> for StimulusMetadata {
    fn from(stimulus: &StimulusDefinition) -> Self {
        Self {
            difficulty: stimulus.difficulty,
            subskill: stimulus.subskill.clone(),
            presentation_params: stimulus.presentation_params.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSignal {
    pub correct: bool,
    pub response_time_ms: f64,
    #[serde(default)]
    pub click_count: u32,
    #[serde(default)]
    pub answer_changed: bool,
}

impl ResponseSignal {
    pub fn correct(response_time_ms: f64) -> Self {
        Self {
            correct: true,
            response_time_ms,
            click_count: 1,
            answer_changed: false,
        }
    }

    pub fn incorrect(response_time_ms: f64) -> Self {
        Self {
            correct: false,
            ..Self::correct(response_time_ms)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub user_id: String,
    pub session_id: String,
    pub test_id: String,
    pub stimulus_id: String,
    #[serde(rename = "metadata")]
    pub stimulus_metadata: StimulusMetadata,
    pub response: ResponseSignal,
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl ObservationRecord {
    /// Builds a record for `stimulus`, stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        test_id: impl Into<String>,
        stimulus: &StimulusDefinition,
        response: ResponseSignal,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            test_id: test_id.into(),
            stimulus_id: stimulus.stimulus_id.clone(),
            stimulus_metadata: StimulusMetadata::from(stimulus),
            response,
            timestamp: now_millis(),
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn subskill_key(&self) -> &str {
        self.stimulus_metadata
            .subskill
            .as_deref()
            .unwrap_or(GLOBAL_SUBSKILL)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubskillSnapshot {
    pub mean: f64,
    pub variance: f64,
    pub fatigue: f64,
    pub observations: u64,
    pub recent_accuracy: f64,
    pub answer_change_rate: f64,
    pub mean_response_ms: f64,
    pub last_observation_ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSnapshot {
    pub observations: usize,
    pub recent_accuracy: f64,
    pub mean_response_ms: f64,
    pub last_difficulty: Option<f64>,
}

/// Read-only view of one user's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub user_id: String,
    pub subskills: BTreeMap<String, SubskillSnapshot>,
    pub tests: BTreeMap<String, TestSnapshot>,
    pub fatigue: f64,
    pub mean_interaction_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Continue,
    Inconclusive,
    Stop,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Inconclusive => "inconclusive",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningOutcome {
    Normal,
    RecommendProfessionalCheck,
    Inconclusive,
}

impl ScreeningOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::RecommendProfessionalCheck => "recommend_professional_check",
            Self::Inconclusive => "inconclusive",
        }
    }
}

/// The stimulus chosen for presentation and the score it won with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedStimulus {
    pub test_id: String,
    pub stimulus: StimulusDefinition,
    pub target_subskill: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAction {
    pub next_action: Option<SelectedStimulus>,
    pub confidence_vector: BTreeMap<String, f64>,
    pub uncertainty_score: f64,
    pub session_status: SessionStatus,
    pub screening_outcome: ScreeningOutcome,
}
