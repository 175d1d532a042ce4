use anyhow::{bail, Context, Result};
use rollcall_core::{DEFAULT_COOLDOWN_SECS, DEFAULT_MATCH_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One day; longer cooldowns would outlast the attendance day itself.
const MAX_COOLDOWN_SECS: u64 = 86_400;

/// Which face detector locates faces in photos and frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    /// Treat every image as one pre-cropped face.
    WholeFrame,
    /// SCRFD ONNX model (requires the `scrfd` feature).
    Scrfd,
}

impl std::str::FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "whole-frame" => Ok(Self::WholeFrame),
            "scrfd" => Ok(Self::Scrfd),
            other => bail!("unknown detector {other:?} (expected whole-frame or scrfd)"),
        }
    }
}

/// CLI configuration: defaults, then an optional TOML file, then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of `<identity>.<ext>` reference photos.
    pub faces_dir: PathBuf,
    /// Path to the SQLite attendance ledger.
    pub db_path: PathBuf,
    /// Mean correlation an identity must strictly exceed.
    pub match_threshold: f64,
    /// Seconds between automatic recognition attempts in a live session.
    pub cooldown_secs: u64,
    pub detector: DetectorKind,
    /// Directory containing `det_10g.onnx` for the SCRFD detector.
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            faces_dir: PathBuf::from("faces"),
            db_path: data_dir.join("attendance.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS as u64,
            detector: DetectorKind::WholeFrame,
            model_dir: data_dir.join("models"),
        }
    }
}

impl Config {
    /// Load configuration. `path` wins over `ROLLCALL_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(file) => {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read config {}", file.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("invalid config {}", file.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `ROLLCALL_*` variables supplied by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ROLLCALL_FACES_DIR") {
            self.faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_MATCH_THRESHOLD") {
            self.match_threshold = v
                .parse()
                .with_context(|| format!("ROLLCALL_MATCH_THRESHOLD={v:?} is not a number"))?;
        }
        if let Some(v) = lookup("ROLLCALL_COOLDOWN_SECS") {
            self.cooldown_secs = v
                .parse()
                .with_context(|| format!("ROLLCALL_COOLDOWN_SECS={v:?} is not a whole number"))?;
        }
        if let Some(v) = lookup("ROLLCALL_DETECTOR") {
            self.detector = v.parse()?;
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.match_threshold) {
            bail!(
                "match_threshold {} is outside the correlation range [-1, 1]",
                self.match_threshold
            );
        }
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            bail!(
                "cooldown_secs {} exceeds the {MAX_COOLDOWN_SECS}s limit",
                self.cooldown_secs
            );
        }
        Ok(())
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs.min(MAX_COOLDOWN_SECS) as i64)
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
