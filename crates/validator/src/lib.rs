//! Market-compass validation loop
//!
//! Periodically asks every registered worker for an answer, scores the
//! answers through a pluggable [`ScoringStrategy`] and submits a normalized
//! weight vote to the subnet registry.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod ground_truth;
pub mod mock;
pub mod orchestrator;
pub mod scoring;
pub mod throttle;

pub use backend::{HttpTaskBackend, TaskBackend, TaskFeed};
pub use config::{StrategyKind, ThrottleConfig, ValidatorSettings};
pub use dispatcher::WorkerDispatcher;
pub use ground_truth::{match_ratio, GroundTruthSource, SearchWindow, TwitterSearchClient};
pub use orchestrator::{
    AbandonReason, IterationOutcome, IterationPhase, OrchestratorStatus, ValidationOrchestrator,
};
pub use scoring::{
    build_strategy, DelegatedStrategy, DirectCheckStrategy, PassthroughStrategy, ScoringPlan,
    ScoringStrategy,
};
pub use throttle::{ThrottleLedger, ThrottleSnapshot};
