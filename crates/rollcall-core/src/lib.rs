//! rollcall-core — Face signature matching and attendance session engine.
//!
//! Turns detected face regions into intensity-histogram signatures, scores
//! them against an enrollment store built from reference photos, and drives
//! per-day attendance marks from a frame stream with a recognition cooldown.

pub mod detector;
pub mod enrollment;
pub mod matcher;
#[cfg(feature = "scrfd")]
pub mod scrfd;
pub mod session;
pub mod signature;
pub mod types;

pub use detector::{largest_face, DetectorError, FaceDetector, WholeFrameDetector};
pub use enrollment::{
    enroll_image, EnrollmentError, EnrollmentReport, EnrollmentStore, SkipReason,
};
pub use matcher::{recognize, CorrelationMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use session::{
    AttendanceLedger, CooldownState, FrameReport, LiveSession, MarkOutcome, RegionReport,
    RegionStatus, DEFAULT_COOLDOWN_SECS,
};
pub use signature::{crop_region, extract, SignatureError};
pub use types::{BoundingBox, MatchResult, Signature};
