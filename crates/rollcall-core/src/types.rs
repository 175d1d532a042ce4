use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    /// Box area (width × height). Degenerate boxes report 0.
    pub fn area(&self) -> f32 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }
}

/// Face signature: a normalized intensity histogram (256 bins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    values: Vec<f32>,
}

impl Signature {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pearson correlation coefficient between two signatures.
    ///
    /// Returns a value in [-1, 1]. A signature with zero variance (constant
    /// histogram) has no defined correlation and scores 0.
    pub fn similarity(&self, other: &Signature) -> f64 {
        let n = self.values.len().min(other.values.len());
        if n == 0 {
            return 0.0;
        }

        let a = &self.values[..n];
        let b = &other.values[..n];
        let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n as f64;

        let mut cov = 0.0f64;
        let mut var_a = 0.0f64;
        let mut var_b = 0.0f64;
        for (&x, &y) in a.iter().zip(b.iter()) {
            let dx = x as f64 - mean_a;
            let dy = y as f64 - mean_b;
            cov += dx * dy;
            var_a += dx * dx;
            var_b += dy * dy;
        }

        if var_a <= 0.0 || var_b <= 0.0 {
            return 0.0;
        }

        let r = cov / (var_a * var_b).sqrt();
        if r.is_finite() {
            r.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Outcome of matching a probe signature against the enrollment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Accepted identity, `None` when the face is unknown.
    pub identity: Option<String>,
    /// Mean similarity of the accepted identity. For unknown faces this is
    /// the decision threshold and carries no information.
    pub score: f64,
}

impl MatchResult {
    pub fn unknown(threshold: f64) -> Self {
        Self {
            identity: None,
            score: threshold,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}
