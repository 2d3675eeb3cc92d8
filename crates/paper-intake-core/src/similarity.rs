//! Duplicate scoring between an upload and a stored document.
//!
//! # Scoring
//!
//! 1. **Filename score** (`0–100`): exact normalized name → 100, same stem
//!    with a different extension → 90, otherwise Levenshtein similarity of
//!    the stems rescaled above a noise floor and capped at 85.
//! 2. **Content score** (`0–100` or neutral): equal SHA-256 fingerprints of
//!    the normalized text → 100, otherwise Jaccard overlap of the token sets.
//!    Neutral when either side has no text.
//! 3. **Confidence**: `filename_weight × filename + content_weight × content`.
//!    With neutral content the filename score stands alone but stays below
//!    `high_threshold`, so a missing text layer can never block an upload.
//!    An exact filename match is floored at `exact_filename_floor`.
//!
//! All weights and thresholds live in [`ScoringPolicy`] so deployments can
//! tune them from configuration.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::models::{name_key, Classification, Recommendation};

/// Tunable weights and thresholds for duplicate scoring.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub filename_weight: f64,
    pub content_weight: f64,
    /// At or above: duplicate, block the upload.
    pub high_threshold: f64,
    /// Below: unique, allow silently. Matches under this are dropped.
    pub low_threshold: f64,
    /// Minimum confidence for an exact filename match.
    pub exact_filename_floor: f64,
    /// Stem edit-distance similarity at or below this scores zero.
    pub filename_noise_floor: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            filename_weight: 0.35,
            content_weight: 0.65,
            high_threshold: 90.0,
            low_threshold: 40.0,
            exact_filename_floor: 60.0,
            filename_noise_floor: 0.5,
        }
    }
}

/// Ceiling for a fuzzy (non-identical) filename match.
const FUZZY_FILENAME_CAP: f64 = 85.0;
/// Score for the same stem under a different extension.
const SAME_STEM_SCORE: f64 = 90.0;

impl ScoringPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("filename_weight", self.filename_weight),
            ("content_weight", self.content_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                bail!("detection.{} must be in [0.0, 1.0]", name);
            }
        }
        if ((self.filename_weight + self.content_weight) - 1.0).abs() > 1e-6 {
            bail!("detection.filename_weight + detection.content_weight must equal 1.0");
        }
        if !(0.0..=100.0).contains(&self.low_threshold)
            || !(0.0..=100.0).contains(&self.high_threshold)
        {
            bail!("detection thresholds must be in [0, 100]");
        }
        if self.low_threshold >= self.high_threshold {
            bail!("detection.low_threshold must be below detection.high_threshold");
        }
        if !(0.0..=100.0).contains(&self.exact_filename_floor) {
            bail!("detection.exact_filename_floor must be in [0, 100]");
        }
        if !(0.0..1.0).contains(&self.filename_noise_floor) {
            bail!("detection.filename_noise_floor must be in [0.0, 1.0)");
        }
        Ok(())
    }

    /// Scores an upload against one stored document.
    pub fn score(&self, upload: &Fingerprint, stored: &Fingerprint) -> PairScore {
        let filename = self.filename_score(&upload.name, &stored.name);
        let content = content_score(upload.text.as_ref(), stored.text.as_ref());

        let mut confidence = match content {
            Some(c) => self.filename_weight * filename + self.content_weight * c,
            None => filename.min(self.high_threshold - 1.0),
        };
        if upload.name.full == stored.name.full {
            confidence = confidence.max(self.exact_filename_floor);
        }

        PairScore {
            filename: round1(filename),
            content: content.map(round1),
            confidence: round1(confidence.clamp(0.0, 100.0)),
        }
    }

    /// Maps a confidence onto the three decision bands.
    pub fn classify(&self, confidence: f64) -> (Classification, Recommendation) {
        if confidence >= self.high_threshold {
            (Classification::Duplicate, Recommendation::BlockUpload)
        } else if confidence >= self.low_threshold {
            (Classification::PossibleDuplicate, Recommendation::OfferReplace)
        } else {
            (Classification::Unique, Recommendation::Allow)
        }
    }

    fn filename_score(&self, a: &NormalizedName, b: &NormalizedName) -> f64 {
        if a.full == b.full {
            return 100.0;
        }
        if !a.stem.is_empty() && a.stem == b.stem {
            return SAME_STEM_SCORE;
        }
        let sim = normalized_levenshtein(&a.stem, &b.stem);
        if sim <= self.filename_noise_floor {
            return 0.0;
        }
        (sim - self.filename_noise_floor) / (1.0 - self.filename_noise_floor) * FUZZY_FILENAME_CAP
    }
}

/// Per-candidate score breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub filename: f64,
    pub content: Option<f64>,
    pub confidence: f64,
}

/// Normalized filename and text of one document, computed once per upload.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    name: NormalizedName,
    text: Option<NormalizedText>,
}

impl Fingerprint {
    pub fn new(file_name: &str, content: &str) -> Self {
        Self {
            name: NormalizedName::new(file_name),
            text: NormalizedText::new(content),
        }
    }
}

#[derive(Debug, Clone)]
struct NormalizedName {
    full: String,
    stem: String,
}

impl NormalizedName {
    fn new(raw: &str) -> Self {
        let full = name_key(raw);
        let stem = match full.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => full.clone(),
        };
        Self { full, stem }
    }
}

#[derive(Debug, Clone)]
struct NormalizedText {
    hash: String,
    tokens: HashSet<String>,
}

impl NormalizedText {
    fn new(raw: &str) -> Option<Self> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        let normalized = collapsed.to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let tokens = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Some(Self { hash, tokens })
    }
}

fn content_score(a: Option<&NormalizedText>, b: Option<&NormalizedText>) -> Option<f64> {
    let (a, b) = (a?, b?);
    if a.hash == b.hash {
        return Some(100.0);
    }
    if a.tokens.is_empty() || b.tokens.is_empty() {
        return Some(0.0);
    }
    let shared = a.tokens.intersection(&b.tokens).count();
    let union = a.tokens.len() + b.tokens.len() - shared;
    Some(shared as f64 / union as f64 * 100.0)
}

/// `1 - levenshtein(a, b) / max(len)`, over chars. Two empty strings are identical.
fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[b.len()] as f64 / max_len as f64
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
