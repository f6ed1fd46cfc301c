//! # screening-engine
//!
//! Online adaptive item selection for short diagnostic screening sessions
//! (color vision, acuity and similar). After each response the engine
//! decides which stimulus to present next, whether to stop, and which
//! screening outcome to report.
//!
//! - [`stats`] - Welford accumulator and rolling windows
//! - [`clusters`] - wrong-answer buckets by sub-skill and difficulty
//! - [`model`] - per-user Beta posteriors, test windows and fatigue
//! - [`registry`] - stimulus catalog per test
//! - [`engine`] - ingestion and next-action selection
//! - [`replay`] - scripted session replay
//!
//! ```rust
//! use screening_engine::{AdaptiveEngine, ObservationRecord, ResponseSignal, StimulusDefinition};
//!
//! let engine = AdaptiveEngine::default();
//! let easy = StimulusDefinition::new("plate_easy", 0.2).with_subskill("red_green");
//! let hard = StimulusDefinition::new("plate_hard", 0.8).with_subskill("red_green");
//! engine.register_test("color", vec![easy.clone(), hard]);
//!
//! let record = ObservationRecord::new("user_1", "session_1", "color", &easy, ResponseSignal::incorrect(2400.0));
//! engine.ingest_observation(&record);
//!
//! let action = engine.select_next_action("user_1", None);
//! assert_eq!(action.next_action.unwrap().stimulus.stimulus_id, "plate_easy");
//! ```

pub mod clusters;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod replay;
pub mod stats;
pub mod types;

pub use config::EngineConfig;
pub use engine::AdaptiveEngine;
pub use error::{ConfigError, EngineError};
pub use types::*;
