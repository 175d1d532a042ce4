//! Enrollment store: identity → reference signatures.
//!
//! Built once from a directory of `<identity>.<ext>` reference photos and
//! never mutated afterwards. Rebuilding means constructing a new store.

use crate::detector::{largest_face, FaceDetector};
use crate::signature::{self, crop_region};
use crate::types::Signature;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference photo extensions accepted by the builder (case-insensitive).
pub const ENROLLMENT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("enrollment directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a reference photo contributed no signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreadable(String),
    Detector(String),
    NoFaceDetected,
    InvalidRegion,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "unreadable image: {e}"),
            SkipReason::Detector(e) => write!(f, "detector failed: {e}"),
            SkipReason::NoFaceDetected => write!(f, "no face detected"),
            SkipReason::InvalidRegion => write!(f, "face region is empty"),
        }
    }
}

/// What happened to each file during a build.
#[derive(Debug, Default, Clone)]
pub struct EnrollmentReport {
    pub loaded: Vec<(String, PathBuf)>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

/// Immutable mapping of identity → non-empty list of reference signatures.
///
/// Iteration is in lexicographic identity order.
#[derive(Debug, Default, Clone)]
pub struct EnrollmentStore {
    entries: BTreeMap<String, Vec<Signature>>,
}

impl EnrollmentStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every reference photo in `dir`.
    ///
    /// A missing directory is created and yields an empty store. Unreadable
    /// files and photos without a detectable face are skipped with a warning.
    pub fn build<D: FaceDetector + ?Sized>(
        dir: &Path,
        detector: &mut D,
    ) -> Result<(Self, EnrollmentReport), EnrollmentError> {
        let io_err = |source| EnrollmentError::Io {
            path: dir.to_path_buf(),
            source,
        };

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
            tracing::info!(
                dir = %dir.display(),
                "enrollment directory created; add reference photos named <identity>.jpg"
            );
            return Ok((Self::empty(), EnrollmentReport::default()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_enrollment_extension(path))
            .collect();
        paths.sort();

        let mut store = Self::empty();
        let mut report = EnrollmentReport::default();

        for path in paths {
            let Some(identity) = identity_from_path(&path) else {
                continue;
            };

            let outcome = image::open(&path)
                .map_err(|e| SkipReason::Unreadable(e.to_string()))
                .and_then(|image| enroll_image(&image, &mut *detector));

            match outcome {
                Ok(signature) => {
                    tracing::info!(
                        identity = %identity,
                        path = %path.display(),
                        "reference face loaded"
                    );
                    store.insert(identity.clone(), signature);
                    report.loaded.push((identity, path));
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "skipping reference photo");
                    report.skipped.push((path, reason));
                }
            }
        }

        tracing::info!(
            identities = store.len(),
            signatures = store.signature_count(),
            skipped = report.skipped.len(),
            "enrollment store built"
        );

        Ok((store, report))
    }

    fn insert(&mut self, identity: String, signature: Signature) {
        self.entries.entry(identity).or_default().push(signature);
    }

    /// Number of enrolled identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of reference signatures across all identities.
    pub fn signature_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn signatures(&self, identity: &str) -> Option<&[Signature]> {
        self.entries.get(identity).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Signature])> {
        self.entries
            .iter()
            .map(|(identity, sigs)| (identity.as_str(), sigs.as_slice()))
    }
}

/// Repeated identities append rather than overwrite.
impl FromIterator<(String, Signature)> for EnrollmentStore {
    fn from_iter<T: IntoIterator<Item = (String, Signature)>>(iter: T) -> Self {
        let mut store = Self::empty();
        for (identity, signature) in iter {
            store.insert(identity, signature);
        }
        store
    }
}

/// Detect the largest face in a reference photo and extract its signature.
pub fn enroll_image<D: FaceDetector + ?Sized>(
    image: &DynamicImage,
    detector: &mut D,
) -> Result<Signature, SkipReason> {
    let faces = detector
        .detect_image(image)
        .map_err(|e| SkipReason::Detector(e.to_string()))?;
    let face = largest_face(&faces).ok_or(SkipReason::NoFaceDetected)?;
    tracing::debug!(
        faces = faces.len(),
        x = face.x,
        y = face.y,
        width = face.width,
        height = face.height,
        "reference face selected"
    );
    let region = crop_region(image, face).map_err(|_| SkipReason::InvalidRegion)?;
    signature::extract(&region).map_err(|_| SkipReason::InvalidRegion)
}

/// Identity label of a reference photo: its file stem.
pub fn identity_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

fn has_enrollment_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ENROLLMENT_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::types::BoundingBox;
    use image::{GrayImage, Luma};

    /// Detector returning a fixed set of boxes for every frame.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rollcall-enroll-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    /// Left half dark, right half bright: the two halves give distinct signatures.
    fn split_image() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Luma([30])
            } else {
                Luma([220])
            }
        }))
    }

    #[test]
    fn test_largest_face_crop_used() {
        let image = split_image();
        // Area 100 box over the bright half, nested inside an area 400 box
        // straddling both halves.
        let small = BoundingBox::new(22.0, 5.0, 10.0, 10.0);
        let large = BoundingBox::new(10.0, 0.0, 20.0, 20.0);
        let mut detector = FixedDetector(vec![small.clone(), large.clone()]);

        let signature = enroll_image(&image, &mut detector).unwrap();
        let expected = signature::extract(&crop_region(&image, &large).unwrap()).unwrap();
        assert_eq!(signature, expected);
        assert!(signature.values()[30] > 0.25);

        let bright_only = signature::extract(&crop_region(&image, &small).unwrap()).unwrap();
        assert_eq!(bright_only.values()[30], 0.0);
    }

    #[test]
    fn test_no_face_skipped() {
        let mut detector = FixedDetector(vec![]);
        assert_eq!(
            enroll_image(&split_image(), &mut detector),
            Err(SkipReason::NoFaceDetected)
        );
    }

    #[test]
    fn test_face_outside_frame_skipped() {
        let mut detector = FixedDetector(vec![BoundingBox::new(500.0, 500.0, 10.0, 10.0)]);
        assert_eq!(
            enroll_image(&split_image(), &mut detector),
            Err(SkipReason::InvalidRegion)
        );
    }

    #[test]
    fn test_missing_dir_created_empty() {
        let dir = scratch_dir("missing");
        let (store, report) =
            EnrollmentStore::build(&dir, &mut FixedDetector(vec![])).unwrap();
        assert!(store.is_empty());
        assert!(report.loaded.is_empty());
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_build_skips_and_appends() {
        let dir = scratch_dir("build");
        std::fs::create_dir_all(&dir).unwrap();
        split_image().save(dir.join("alice.png")).unwrap();
        split_image().save(dir.join("alice.jpeg")).unwrap();
        split_image().save(dir.join("bob.png")).unwrap();
        std::fs::write(dir.join("carol.jpg"), b"not an image").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let mut detector = FixedDetector(vec![BoundingBox::new(0.0, 0.0, 40.0, 20.0)]);
        let (store, report) = EnrollmentStore::build(&dir, &mut detector).unwrap();

        assert_eq!(store.identities().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(store.signatures("alice").unwrap().len(), 2);
        assert_eq!(store.signature_count(), 3);
        assert_eq!(report.loaded.len(), 3);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].1, SkipReason::Unreadable(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_identity_from_path() {
        assert_eq!(identity_from_path(Path::new("faces/alice.jpg")).as_deref(), Some("alice"));
        assert_eq!(
            identity_from_path(Path::new("faces/mary.jane.png")).as_deref(),
            Some("mary.jane")
        );
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_enrollment_extension(Path::new("a.jpeg")));
        assert!(has_enrollment_extension(Path::new("a.PNG")));
        assert!(!has_enrollment_extension(Path::new("a.gif")));
        assert!(!has_enrollment_extension(Path::new("jpg")));
    }
}
