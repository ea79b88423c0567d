//! Recognition and liveness decision engine for attendance capture.

pub mod alerts;
pub mod boundary;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod faces;
pub mod ledger;
pub mod liveness;
pub mod mask;
pub mod summary;

pub use alerts::{AlertEmitter, AlertLedger, AlertState, AnomalyAlert, AnomalyType, Severity};
pub use decision::{DecisionEngine, DecisionPolicy, DecisionRule, LivenessStatus, Outcome, Status};
pub use engine::{
    AlertDelivery, AttemptReport, AttendanceEngine, AttendanceStatus, EngineSettings,
    RecognitionAttempt,
};
pub use errors::{AppError, AppResult};
pub use ledger::{AttendanceLedger, AttendanceRecord};
pub use liveness::{FrameSample, LivenessAnalyzer, LivenessReason, LivenessVerdict};
pub use mask::{MaskClassifier, MaskStatus};
pub use summary::DailySummary;
