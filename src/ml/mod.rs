//! ML serving core (C10-C13): model registry, inference runtime,
//! performance tracking, and drift detection.
//!
//! See DESIGN.md for what this module is grounded on.

pub mod drift;
pub mod inference;
pub mod performance;
pub mod registry;

pub use drift::{DriftDetector, DriftMethod, DriftReport, DriftSeverity};
pub use inference::{InferenceRuntime, ModelLoader, StubLoader};
pub use performance::{PerformanceTracker, Window, WindowAggregate};
pub use registry::{ModelRegistry, ModelStage, ModelVersionRecord};
