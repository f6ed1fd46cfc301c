//! Scripted replay through files, the way the screening-replay binary runs.

use std::io::Write;

use screening_engine::replay::{run_script, SessionScript};
use screening_engine::{EngineConfig, EngineError, SessionStatus};

const SCRIPT: &str = r#"{
  "tests": [
    {
      "testId": "color",
      "stimuli": [
        { "stimulusId": "plate_easy", "difficulty": 0.2, "subskill": "red_green",
          "presentationParams": { "plate": "ishihara_1" } },
        { "stimulusId": "plate_hard", "difficulty": 0.8, "subskill": "red_green" }
      ]
    },
    { "testId": "empty", "stimuli": [] }
  ],
  "observations": [
    {
      "userId": "u1", "sessionId": "s1", "testId": "color", "stimulusId": "plate_easy",
      "metadata": { "difficulty": 0.2, "subskill": "red_green" },
      "response": { "correct": false, "responseTimeMs": 2400.0, "clickCount": 1, "answerChanged": false },
      "timestamp": 1700000000000
    },
    {
      "userId": "u1", "sessionId": "s1", "testId": "color", "stimulusId": "plate_easy",
      "metadata": { "difficulty": 0.2, "subskill": "red_green" },
      "response": { "correct": true, "responseTimeMs": 1800.0, "clickCount": 2, "answerChanged": true },
      "timestamp": 1700000005000
    }
  ]
}"#;

fn write_script(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write script");
    file
}

#[test]
fn replays_script_from_file() {
    let file = write_script(SCRIPT);
    let script = SessionScript::from_path(file.path()).expect("script parses");
    let steps = run_script(&script, EngineConfig::default()).expect("replay runs");

    assert_eq!(steps.len(), 2);

    let first = &steps[0];
    assert_eq!(first.observation_index, 0);
    assert!((first.decision.confidence_vector["red_green"] - 0.4).abs() < 1e-12);
    let chosen = first.decision.next_action.as_ref().expect("stimulus chosen");
    assert_eq!(chosen.stimulus.stimulus_id, "plate_easy");
    assert!(chosen.stimulus.presentation_params.is_some());

    let second = &steps[1];
    assert!((second.snapshot.subskills["red_green"].mean - 0.5).abs() < 1e-12);
    assert!((second.snapshot.subskills["red_green"].answer_change_rate - 0.5).abs() < 1e-12);
    assert_eq!(second.snapshot.tests["color"].observations, 2);
}

#[test]
fn script_config_overrides_fallback() {
    let mut script: SessionScript = serde_json::from_str(SCRIPT).unwrap();
    script.config = Some(EngineConfig {
        fatigue_stop: 0.0,
        ..Default::default()
    });

    let steps = run_script(&script, EngineConfig::default()).unwrap();
    // Any fatigue above zero stops u1 after the first observation.
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].decision.session_status, SessionStatus::Stop);
}

#[test]
fn invalid_fallback_config_is_rejected() {
    let script: SessionScript = serde_json::from_str(SCRIPT).unwrap();
    let bad = EngineConfig {
        difficulty_bucket_size: -1.0,
        ..Default::default()
    };
    assert!(matches!(run_script(&script, bad), Err(EngineError::Config(_))));
}

#[test]
fn malformed_script_reports_json_error() {
    let file = write_script("{ \"tests\": [ }");
    assert!(matches!(SessionScript::from_path(file.path()), Err(EngineError::Json(_))));
}

#[test]
fn missing_file_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(SessionScript::from_path(&missing), Err(EngineError::Io(_))));
}
