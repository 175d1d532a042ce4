//! Live recognition session over a frame stream.
//!
//! The capture loop hands each frame and its detected faces to
//! [`LiveSession::process_frame`]. Automatic recognition is rate-limited by a
//! cooldown; a manual trigger bypasses it for the first face in the frame.

use crate::enrollment::EnrollmentStore;
use crate::matcher::{recognize, Matcher};
use crate::signature::crop_region;
use crate::types::BoundingBox;
use chrono::{Duration, NaiveDateTime};
use image::DynamicImage;

/// Minimum seconds between automatic recognition attempts.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3;

/// Durable per-day attendance record keeper.
pub trait AttendanceLedger {
    type Error: std::error::Error;

    /// Record `identity` as present on the calendar day of `now`.
    ///
    /// Returns `Ok(false)` when the identity is already recorded that day.
    fn mark(&mut self, identity: &str, now: NaiveDateTime) -> Result<bool, Self::Error>;
}

impl<L: AttendanceLedger + ?Sized> AttendanceLedger for &mut L {
    type Error = L::Error;

    fn mark(&mut self, identity: &str, now: NaiveDateTime) -> Result<bool, Self::Error> {
        (**self).mark(identity, now)
    }
}

/// Automatic-recognition rate limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    /// No automatic attempt yet.
    Idle,
    /// Last automatic attempt happened at `last_attempt`.
    Cooling { last_attempt: NaiveDateTime },
}

/// Display hint for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionStatus {
    Recognized { identity: String, score: f64 },
    Unknown,
    /// Face seen but not scored (inside the cooldown window).
    Detected,
}

/// Ledger outcome of an accepted recognition.
#[derive(Debug)]
pub enum MarkOutcome<E> {
    Recorded,
    AlreadyPresent,
    Failed(E),
}

impl<E> MarkOutcome<E> {
    pub fn is_recorded(&self) -> bool {
        matches!(self, MarkOutcome::Recorded)
    }
}

#[derive(Debug)]
pub struct RegionReport<E> {
    pub face: BoundingBox,
    pub status: RegionStatus,
    pub mark: Option<MarkOutcome<E>>,
}

/// Everything the capture loop needs to render one frame.
#[derive(Debug)]
pub struct FrameReport<E> {
    /// One entry per detected face, in detection order.
    pub regions: Vec<RegionReport<E>>,
    /// Result of the manual trigger, if one was requested and a face was present.
    pub manual: Option<RegionReport<E>>,
}

pub struct LiveSession<'s, M, L> {
    store: &'s EnrollmentStore,
    matcher: M,
    ledger: L,
    cooldown: Duration,
    state: CooldownState,
}

impl<'s, M: Matcher, L: AttendanceLedger> LiveSession<'s, M, L> {
    pub fn new(store: &'s EnrollmentStore, matcher: M, ledger: L) -> Self {
        Self {
            store,
            matcher,
            ledger,
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
            state: CooldownState::Idle,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn state(&self) -> CooldownState {
        self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Process one frame's detections.
    ///
    /// Every automatic attempt advances the cooldown timer, including unknown
    /// faces and unusable regions; the timer does not wait for an accepted
    /// recognition. The manual trigger never touches the timer.
    pub fn process_frame(
        &mut self,
        frame: &DynamicImage,
        faces: &[BoundingBox],
        now: NaiveDateTime,
        manual_trigger: bool,
    ) -> FrameReport<L::Error> {
        let mut regions = Vec::with_capacity(faces.len());

        for face in faces {
            if self.cooled_down(now) {
                let report = self.attempt(frame, face, now);
                self.state = CooldownState::Cooling { last_attempt: now };
                regions.push(report);
            } else {
                regions.push(RegionReport {
                    face: face.clone(),
                    status: RegionStatus::Detected,
                    mark: None,
                });
            }
        }

        let manual = if manual_trigger {
            match faces.first() {
                Some(face) => {
                    let report = self.attempt(frame, face, now);
                    match &report.status {
                        RegionStatus::Recognized { identity, score } => {
                            tracing::info!(identity = %identity, score, "manual scan")
                        }
                        _ => tracing::info!("manual scan: face not recognized"),
                    }
                    Some(report)
                }
                None => {
                    tracing::debug!("manual scan requested with no face in frame");
                    None
                }
            }
        } else {
            None
        };

        FrameReport { regions, manual }
    }

    fn cooled_down(&self, now: NaiveDateTime) -> bool {
        match self.state {
            CooldownState::Idle => true,
            CooldownState::Cooling { last_attempt } => now - last_attempt > self.cooldown,
        }
    }

    /// Recognize one face and mark attendance on acceptance.
    fn attempt(
        &mut self,
        frame: &DynamicImage,
        face: &BoundingBox,
        now: NaiveDateTime,
    ) -> RegionReport<L::Error> {
        let recognized = crop_region(frame, face)
            .and_then(|region| recognize(&region, self.store, &self.matcher));

        let status = match recognized {
            Ok(result) => match result.identity {
                Some(identity) => RegionStatus::Recognized {
                    identity,
                    score: result.score,
                },
                None => RegionStatus::Unknown,
            },
            Err(e) => {
                tracing::debug!(error = %e, "unusable face region; treating as unknown");
                RegionStatus::Unknown
            }
        };

        let mark = match &status {
            RegionStatus::Recognized { identity, .. } => Some(self.mark(identity, now)),
            _ => None,
        };

        RegionReport {
            face: face.clone(),
            status,
            mark,
        }
    }

    fn mark(&mut self, identity: &str, now: NaiveDateTime) -> MarkOutcome<L::Error> {
        match self.ledger.mark(identity, now) {
            Ok(true) => {
                tracing::info!(identity, at = %now, "attendance recorded");
                MarkOutcome::Recorded
            }
            Ok(false) => {
                tracing::info!(identity, "already marked present today");
                MarkOutcome::AlreadyPresent
            }
            Err(e) => {
                tracing::warn!(identity, error = %e, "failed to record attendance");
                MarkOutcome::Failed(e)
            }
        }
    }
}
