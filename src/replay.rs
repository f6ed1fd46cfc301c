//! Scripted replay of a screening session.
//!
//! A script bundles a stimulus catalog with a sequence of recorded
//! observations. Replaying it runs the ingest/select loop a collaborator
//! would drive, which makes it useful for tuning configuration offline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::EngineConfig;
use crate::engine::AdaptiveEngine;
use crate::error::EngineError;
use crate::types::{NextAction, ObservationRecord, SessionStatus, StimulusDefinition, UserSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCatalog {
    pub test_id: String,
    pub stimuli: Vec<StimulusDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScript {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub tests: Vec<TestCatalog>,
    #[serde(default)]
    pub observations: Vec<ObservationRecord>,
    #[serde(default)]
    pub allowed_tests: Option<Vec<String>>,
}

impl SessionScript {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub observation_index: usize,
    pub snapshot: UserSnapshot,
    pub decision: NextAction,
}

/// Runs the script against a fresh engine. `fallback` is used when the
/// script carries no configuration of its own. Each user's loop ends at the
/// first `stop`; later observations for that user are skipped.
pub fn run_script(
    script: &SessionScript,
    fallback: EngineConfig,
) -> Result<Vec<ReplayStep>, EngineError> {
    let config = script.config.clone().unwrap_or(fallback);
    let engine = AdaptiveEngine::new(config)?;

    for catalog in &script.tests {
        engine.register_test(&catalog.test_id, catalog.stimuli.clone());
    }

    let allowed = script.allowed_tests.as_deref();
    let mut stopped: Vec<&str> = Vec::new();
    let mut steps = Vec::with_capacity(script.observations.len());

    for (index, record) in script.observations.iter().enumerate() {
        if stopped.contains(&record.user_id.as_str()) {
            tracing::debug!(user_id = %record.user_id, index, "skipping observation after stop");
            continue;
        }
        let snapshot = engine.ingest_observation(record);
        let decision = engine.select_next_action(&record.user_id, allowed);
        if decision.session_status == SessionStatus::Stop {
            tracing::info!(user_id = %record.user_id, index, "session stopped on fatigue");
            stopped.push(record.user_id.as_str());
        }
        steps.push(ReplayStep {
            observation_index: index,
            snapshot,
            decision,
        });
    }

    Ok(steps)
}
