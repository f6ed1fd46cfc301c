use std::process::ExitCode;

use screening_engine::config::{EngineConfig, RuntimeConfig};
use screening_engine::error::EngineError;
use screening_engine::logging;
use screening_engine::replay::{run_script, SessionScript};

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let runtime = RuntimeConfig::from_env();
    let _log_guard = logging::init_tracing(&runtime.log_level);

    match run(&runtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

fn run(runtime: &RuntimeConfig) -> Result<(), EngineError> {
    let path = runtime
        .script_path
        .as_deref()
        .ok_or(EngineError::MissingScript)?;
    let script = SessionScript::from_path(path)?;
    let fallback = EngineConfig::from_env()?;

    tracing::info!(
        path = %path,
        tests = script.tests.len(),
        observations = script.observations.len(),
        "replaying session script"
    );

    let steps = run_script(&script, fallback)?;
    for step in &steps {
        println!("{}", serde_json::to_string(step)?);
    }

    tracing::info!(steps = steps.len(), "replay complete");
    Ok(())
}
