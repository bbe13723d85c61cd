//! Turning eligible snapshots into recommendations.

pub mod cache;
pub mod claude;
pub mod coefficient;
pub mod engine;
pub mod heuristic;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod totals;

pub use engine::{DecisionEngine, EngineSettings};
pub use provider::{select_provider, LlmProvider, ProviderError};
