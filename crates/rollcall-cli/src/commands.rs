use crate::config::{Config, DetectorKind};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use image::DynamicImage;
use rollcall_core::{
    crop_region, enroll_image, recognize, AttendanceLedger, BoundingBox, CorrelationMatcher,
    EnrollmentStore, FaceDetector, FrameReport, LiveSession, MarkOutcome, MatchResult,
    RegionStatus, WholeFrameDetector,
};
use rollcall_ledger::{AttendanceReport, Ledger, LedgerError};
use std::fmt::Display;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Construct the configured face detector.
pub fn build_detector(config: &Config) -> Result<Box<dyn FaceDetector>> {
    match config.detector {
        DetectorKind::WholeFrame => Ok(Box::new(WholeFrameDetector)),
        #[cfg(feature = "scrfd")]
        DetectorKind::Scrfd => {
            let path = config.model_dir.join(rollcall_core::scrfd::SCRFD_MODEL_FILE);
            let detector = rollcall_core::scrfd::ScrfdDetector::load(&path)?;
            Ok(Box::new(detector))
        }
        #[cfg(not(feature = "scrfd"))]
        DetectorKind::Scrfd => {
            bail!("SCRFD detector not compiled in; rebuild with --features scrfd")
        }
    }
}

fn load_store(config: &Config, detector: &mut dyn FaceDetector) -> Result<EnrollmentStore> {
    let (store, report) = EnrollmentStore::build(&config.faces_dir, detector)?;
    if store.is_empty() {
        tracing::warn!(
            dir = %config.faces_dir.display(),
            skipped = report.skipped.len(),
            "no faces enrolled; every face will be unknown"
        );
    }
    Ok(store)
}

/// Identity labels become file names, so keep them to a single path component.
fn validate_identity(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("identity name is empty");
    }
    if name.starts_with('.') || name.contains(['/', '\\']) {
        bail!("identity name {name:?} must be a plain file name");
    }
    Ok(())
}

pub fn enroll(config: &Config, name: &str, photo: &Path, force: bool) -> Result<()> {
    validate_identity(name)?;

    let image = image::open(photo).with_context(|| format!("failed to read {}", photo.display()))?;
    let mut detector = build_detector(config)?;
    enroll_image(&image, &mut *detector).map_err(|reason| {
        anyhow!("{} is not usable as a reference photo: {reason}", photo.display())
    })?;

    std::fs::create_dir_all(&config.faces_dir)
        .with_context(|| format!("failed to create {}", config.faces_dir.display()))?;
    let target = config.faces_dir.join(format!("{name}.png"));
    if target.exists() && !force {
        bail!("{} already exists; pass --force to replace it", target.display());
    }

    image
        .save(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    tracing::info!(identity = name, path = %target.display(), "reference photo saved");
    println!("Saved reference photo for {name} as {}", target.display());
    Ok(())
}

pub fn list(config: &Config) -> Result<()> {
    let mut detector = build_detector(config)?;
    let (store, report) = EnrollmentStore::build(&config.faces_dir, &mut *detector)?;

    if store.is_empty() {
        println!("No faces enrolled in {}", config.faces_dir.display());
    }
    for (identity, signatures) in store.iter() {
        let n = signatures.len();
        println!("{identity}  ({n} reference{})", if n == 1 { "" } else { "s" });
    }
    for (path, reason) in &report.skipped {
        println!("skipped {}: {reason}", path.display());
    }
    Ok(())
}

/// Recognize each face and, when a ledger is given, mark accepted identities.
///
/// A failed mark is reported on its face; the remaining faces are still
/// processed.
fn identify_faces<L: AttendanceLedger>(
    image: &DynamicImage,
    faces: &[BoundingBox],
    store: &EnrollmentStore,
    matcher: &CorrelationMatcher,
    mut ledger: Option<&mut L>,
    now: NaiveDateTime,
) -> Vec<(MatchResult, Option<MarkOutcome<L::Error>>)> {
    faces
        .iter()
        .map(|face| {
            let recognized = crop_region(image, face)
                .and_then(|region| recognize(&region, store, matcher));
            let result = match recognized {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unusable face region");
                    MatchResult::unknown(matcher.threshold())
                }
            };

            let mark = match (ledger.as_deref_mut(), &result.identity) {
                (Some(ledger), Some(identity)) => Some(mark_identity(ledger, identity, now)),
                _ => None,
            };
            (result, mark)
        })
        .collect()
}

fn mark_identity<L: AttendanceLedger + ?Sized>(
    ledger: &mut L,
    identity: &str,
    now: NaiveDateTime,
) -> MarkOutcome<L::Error> {
    match ledger.mark(identity, now) {
        Ok(true) => MarkOutcome::Recorded,
        Ok(false) => MarkOutcome::AlreadyPresent,
        Err(e) => {
            tracing::warn!(identity, error = %e, "failed to record attendance");
            MarkOutcome::Failed(e)
        }
    }
}

fn mark_label<E>(mark: &MarkOutcome<E>) -> &'static str {
    match mark {
        MarkOutcome::Recorded => "recorded",
        MarkOutcome::AlreadyPresent => "already-present",
        MarkOutcome::Failed(_) => "failed",
    }
}

pub fn identify(config: &Config, path: &Path, mark: bool, json: bool) -> Result<()> {
    let mut detector = build_detector(config)?;
    let store = load_store(config, &mut *detector)?;
    let image =
        image::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    let faces = detector.detect_image(&image)?;

    let matcher = CorrelationMatcher::new(config.match_threshold);
    let mut ledger = if mark { Some(Ledger::open(&config.db_path)?) } else { None };
    let now = Local::now().naive_local();
    let outcomes = identify_faces(&image, &faces, &store, &matcher, ledger.as_mut(), now);

    if json {
        let results: Vec<_> = faces
            .iter()
            .zip(&outcomes)
            .map(|(face, (result, mark))| {
                serde_json::json!({
                    "face": face,
                    "identity": &result.identity,
                    "score": result.is_match().then_some(result.score),
                    "mark": mark.as_ref().map(mark_label),
                    "error": match mark {
                        Some(MarkOutcome::Failed(e)) => Some(e.to_string()),
                        _ => None,
                    },
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if faces.is_empty() {
        println!("No face detected in {}", path.display());
    }
    for (face, (result, mark)) in faces.iter().zip(&outcomes) {
        let status = match &result.identity {
            Some(identity) => format!("{identity} (confidence {:.2})", result.score),
            None => "Unknown".to_string(),
        };
        let suffix = mark
            .as_ref()
            .map(|m| format!(", {}", describe_mark(m)))
            .unwrap_or_default();
        println!(
            "face at ({:.0}, {:.0}) {:.0}x{:.0}: {status}{suffix}",
            face.x, face.y, face.width, face.height
        );
    }
    Ok(())
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

fn describe_status(status: &RegionStatus) -> String {
    match status {
        RegionStatus::Recognized { identity, score } => format!("{identity} ({score:.2})"),
        RegionStatus::Unknown => "Unknown".to_string(),
        RegionStatus::Detected => "Face Detected".to_string(),
    }
}

fn describe_mark<E: Display>(mark: &MarkOutcome<E>) -> String {
    match mark {
        MarkOutcome::Recorded => "attendance recorded".to_string(),
        MarkOutcome::AlreadyPresent => "already marked today".to_string(),
        MarkOutcome::Failed(e) => format!("failed to record attendance: {e}"),
    }
}

fn print_frame(index: usize, path: &Path, report: &FrameReport<LedgerError>) {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    for region in &report.regions {
        let mut line = format!("[{index:>4}] {name}: {}", describe_status(&region.status));
        if let Some(mark) = &region.mark {
            line.push_str(&format!(", {}", describe_mark(mark)));
        }
        println!("{line}");
    }
    if let Some(manual) = &report.manual {
        let status = describe_status(&manual.status);
        let mut line = format!("[{index:>4}] {name}: manual scan: {status}");
        if let Some(mark) = &manual.mark {
            line.push_str(&format!(", {}", describe_mark(mark)));
        }
        println!("{line}");
    }
}

pub fn replay(config: &Config, dir: &Path, interval_ms: u64, manual: &[usize]) -> Result<()> {
    let frames = list_frames(dir)?;
    if frames.is_empty() {
        bail!("no frame images found in {}", dir.display());
    }

    let mut detector = build_detector(config)?;
    let store = load_store(config, &mut *detector)?;
    let ledger = Ledger::open(&config.db_path)?;
    let matcher = CorrelationMatcher::new(config.match_threshold);
    let mut session =
        LiveSession::new(&store, matcher, ledger).with_cooldown(config.cooldown());

    let start = Local::now().naive_local();
    let interval_ms = i64::try_from(interval_ms).context("frame interval too large")?;
    let mut recorded = 0usize;

    for (index, path) in frames.iter().enumerate() {
        let frame = match image::open(path) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable frame"
                );
                continue;
            }
        };
        let faces = match detector.detect_image(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "face detection failed");
                continue;
            }
        };

        let offset = interval_ms.saturating_mul(index as i64);
        let now = start + chrono::Duration::milliseconds(offset);
        let report = session.process_frame(&frame, &faces, now, manual.contains(&index));
        tracing::debug!(index, faces = faces.len(), state = ?session.state(), "frame processed");

        recorded += report
            .regions
            .iter()
            .chain(report.manual.iter())
            .filter(|r| r.mark.as_ref().is_some_and(MarkOutcome::is_recorded))
            .count();
        print_frame(index, path, &report);
    }

    let present = session.ledger().records_on(start.date())?.len();
    println!(
        "Processed {} frames, {recorded} new attendance records, {present} present on {}",
        frames.len(),
        start.date()
    );
    Ok(())
}

pub fn report(config: &Config, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let ledger = Ledger::open(&config.db_path)?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let report = AttendanceReport::build(&ledger, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
