use chrono::{NaiveDate, NaiveDateTime};
use image::{DynamicImage, GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rollcall_core::{
    recognize, CorrelationMatcher, EnrollmentStore, FaceDetector, LiveSession, MarkOutcome,
    RegionStatus, WholeFrameDetector,
};
use rollcall_ledger::{AttendanceReport, Ledger};
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rollcall-e2e-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Synthetic portrait: bright wall, textured oval face, two dark eyes.
fn alice_photo() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(120, 140, |x, y| {
        let (fx, fy) = (x as f32 - 60.0, y as f32 - 70.0);
        let in_face = (fx / 45.0).powi(2) + (fy / 60.0).powi(2) <= 1.0;
        let in_eye = |cx: f32| (x as f32 - cx).powi(2) + (y as f32 - 55.0).powi(2) <= 36.0;
        if in_eye(42.0) || in_eye(78.0) {
            Luma([30])
        } else if in_face {
            Luma([150 + ((x + y) % 20) as u8])
        } else {
            Luma([220])
        }
    }))
}

fn noise_photo() -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(7);
    DynamicImage::ImageLuma8(GrayImage::from_fn(100, 100, |_, _| Luma([rng.gen::<u8>()])))
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[test]
fn enroll_recognize_and_mark() {
    let dir = scratch_dir("enroll");
    let faces_dir = dir.join("faces");
    std::fs::create_dir_all(&faces_dir).unwrap();
    alice_photo().save(faces_dir.join("alice.png")).unwrap();

    let (store, report) = EnrollmentStore::build(&faces_dir, &mut WholeFrameDetector).unwrap();
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(store.identities().collect::<Vec<_>>(), vec!["alice"]);

    let matcher = CorrelationMatcher::default();

    // Same photo as probe is accepted well above the threshold.
    let probe = image::open(faces_dir.join("alice.png")).unwrap();
    let result = recognize(&probe, &store, &matcher).unwrap();
    assert_eq!(result.identity.as_deref(), Some("alice"));
    assert!(result.score > 0.7, "score = {}", result.score);

    // Random noise is rejected.
    let noise = recognize(&noise_photo(), &store, &matcher).unwrap();
    assert!(!noise.is_match(), "noise matched with score {}", noise.score);

    // Live session against a file-backed ledger creates one record.
    let ledger = Ledger::open(&dir.join("data").join("attendance.db")).unwrap();
    let mut session = LiveSession::new(&store, matcher, ledger);
    let faces = WholeFrameDetector.detect_image(&probe).unwrap();
    let frame = session.process_frame(&probe, &faces, at(8, 30, 0), false);
    assert!(matches!(
        &frame.regions[0].status,
        RegionStatus::Recognized { identity, .. } if identity == "alice"
    ));
    assert!(matches!(frame.regions[0].mark, Some(MarkOutcome::Recorded)));

    let frame = session.process_frame(&probe, &faces, at(8, 30, 5), true);
    assert!(matches!(
        frame.manual.and_then(|m| m.mark),
        Some(MarkOutcome::AlreadyPresent)
    ));
    drop(session);

    // Records survive a reopen.
    let ledger = Ledger::open(&dir.join("data").join("attendance.db")).unwrap();
    let report = AttendanceReport::build(&ledger, at(0, 0, 0).date()).unwrap();
    assert_eq!(report.present_count(), 1);
    assert_eq!(report.today[0].identity, "alice");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn two_handles_on_one_file_still_dedup() {
    let dir = scratch_dir("shared");
    let path = dir.join("attendance.db");
    let first = Ledger::open(&path).unwrap();
    let second = Ledger::open(&path).unwrap();

    assert!(first.mark("alice", at(9, 0, 0)).unwrap());
    assert!(!second.mark("alice", at(9, 0, 1)).unwrap());
    assert!(second.mark("bob", at(9, 0, 2)).unwrap());
    assert!(!first.mark("bob", at(9, 0, 3)).unwrap());
    assert_eq!(first.records().unwrap().len(), 2);

    drop((first, second));
    let _ = std::fs::remove_dir_all(&dir);
}
