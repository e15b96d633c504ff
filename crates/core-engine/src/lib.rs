//! core-engine: the event-processing pipeline and the engine facade.
//!
//! Layering: [`taphold`] owns the per-trigger state machines, [`processor`]
//! is the synchronous hot path over one compiled-config snapshot,
//! [`metrics`] aggregates hot-path timing, and [`engine`] composes the lot
//! with the platform collaborators, the notification bus, and the lifecycle
//! command queue.

pub mod engine;
pub mod metrics;
pub mod processor;
pub mod taphold;

pub use engine::{
    ConfigInfo, Engine, EngineError, EngineHandle, EngineState, KeymapSummary, StatusSnapshot,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use processor::{InvestigateInfo, ProcessResult, Processor};
pub use taphold::{TapHoldDetector, TapHoldEffect, TriggerState};
