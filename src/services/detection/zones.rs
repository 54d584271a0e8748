// Zone Classifier
// Maps a document spread onto five calibrated bands. Calibration is versioned
// data: shipped as JSON, loadable from disk, re-derivable from a labeled corpus.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::config_store::ConfigError;

pub const REFERENCE_VERSION: &str = "v1-wiki300-llama31-8b";

const MIXED_ZONE: usize = 2;
const REFERENCE_SOFT_SCORES: [f64; 5] = [0.02, 0.25, 0.50, 0.75, 0.98];

/// Which class sits at the high end of the spread axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadDirection {
    HigherIsAi,
    HigherIsHuman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneLabel {
    HighAi,
    LikelyAi,
    Mixed,
    LikelyHuman,
    HighHuman,
}

impl ZoneLabel {
    const ALL: [ZoneLabel; 5] = [
        ZoneLabel::HighAi,
        ZoneLabel::LikelyAi,
        ZoneLabel::Mixed,
        ZoneLabel::LikelyHuman,
        ZoneLabel::HighHuman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneLabel::HighAi => "high_ai",
            ZoneLabel::LikelyAi => "likely_ai",
            ZoneLabel::Mixed => "mixed",
            ZoneLabel::LikelyHuman => "likely_human",
            ZoneLabel::HighHuman => "high_human",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCalibration {
    /// Validated accuracy of the zone on the reference corpus
    pub confidence: f64,
    /// Human-likeness handed to the arbitrator, 0 = AI, 1 = human
    pub soft_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneThresholds {
    pub version: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub direction: SpreadDirection,
    pub human_mean: f64,
    pub human_sigma: f64,
    pub ai_mean: f64,
    pub ai_sigma: f64,
    /// Zone 1 (high AI) through zone 5 (high human)
    pub zones: [ZoneCalibration; 5],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneResult {
    /// 1..=5
    pub zone: u8,
    pub label: ZoneLabel,
    pub confidence: f64,
    pub soft_score: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        let confidences = [0.8675, 0.7465, 0.50, 0.6753, 0.9486];
        let mut zones = [ZoneCalibration {
            confidence: 0.5,
            soft_score: 0.5,
        }; 5];
        for (i, zone) in zones.iter_mut().enumerate() {
            zone.confidence = confidences[i];
            zone.soft_score = REFERENCE_SOFT_SCORES[i];
        }

        Self {
            version: REFERENCE_VERSION.to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            direction: SpreadDirection::HigherIsAi,
            human_mean: 0.030963,
            human_sigma: 0.004083,
            ai_mean: 0.036824,
            ai_sigma: 0.003366,
            zones,
        }
    }
}

/// Boundaries on an axis oriented so that larger values are more AI-like.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrientedBounds {
    human_mean: f64,
    inner_lower: f64,
    inner_upper: f64,
    ai_mean: f64,
}

impl ZoneThresholds {
    fn orient(&self, value: f64) -> f64 {
        match self.direction {
            SpreadDirection::HigherIsAi => value,
            SpreadDirection::HigherIsHuman => -value,
        }
    }

    fn oriented_bounds(&self) -> OrientedBounds {
        let human_mean = self.orient(self.human_mean);
        let ai_mean = self.orient(self.ai_mean);
        OrientedBounds {
            human_mean,
            inner_lower: human_mean + 0.5 * self.human_sigma,
            inner_upper: ai_mean - 0.5 * self.ai_sigma,
            ai_mean,
        }
    }

    /// The four boundaries on the raw spread axis, ascending.
    pub fn boundaries(&self) -> [f64; 4] {
        let b = self.oriented_bounds();
        let oriented = [b.human_mean, b.inner_lower, b.inner_upper, b.ai_mean];
        let mut raw = oriented.map(|v| self.orient(v));
        raw.sort_by(f64::total_cmp);
        raw
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let stats = [self.human_mean, self.human_sigma, self.ai_mean, self.ai_sigma];
        if stats.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "calibration {}: means and sigmas must be finite",
                self.version
            )));
        }
        if self.human_sigma < 0.0 || self.ai_sigma < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "calibration {}: sigmas must be non-negative",
                self.version
            )));
        }
        for (i, zone) in self.zones.iter().enumerate() {
            if !(0.0..=1.0).contains(&zone.confidence) || !(0.0..=1.0).contains(&zone.soft_score) {
                return Err(ConfigError::Invalid(format!(
                    "calibration {}: zone {} confidence and softScore must be within [0, 1]",
                    self.version,
                    i + 1
                )));
            }
        }

        let b = self.oriented_bounds();
        let ordered =
            b.human_mean < b.inner_lower && b.inner_lower <= b.inner_upper && b.inner_upper < b.ai_mean;
        if !ordered {
            return Err(ConfigError::Invalid(format!(
                "calibration {}: zone boundaries are not ordered for direction {:?}",
                self.version, self.direction
            )));
        }
        Ok(())
    }

    /// Zone index 0..5 (zone 1 first).
    ///
    /// Inclusivity on the oriented axis: zone 1 `> ai_mean`; zone 2
    /// `(inner_upper, ai_mean]`; zone 3 `[inner_lower, inner_upper]`;
    /// zone 4 `[human_mean, inner_lower)`; zone 5 `< human_mean`.
    /// Non-finite spreads land in zone 3.
    fn zone_index(&self, spread: f64) -> usize {
        if !spread.is_finite() {
            return MIXED_ZONE;
        }
        let x = self.orient(spread);
        let b = self.oriented_bounds();
        if x > b.ai_mean {
            0
        } else if x > b.inner_upper {
            1
        } else if x >= b.inner_lower {
            2
        } else if x >= b.human_mean {
            3
        } else {
            4
        }
    }

    pub fn classify(&self, spread: f64) -> ZoneResult {
        let idx = self.zone_index(spread);
        let zone = self.zones[idx];
        ZoneResult {
            zone: (idx + 1) as u8,
            label: ZoneLabel::ALL[idx],
            confidence: zone.confidence,
            soft_score: zone.soft_score,
        }
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let thresholds: ZoneThresholds =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                what: path.display().to_string(),
                source: e,
            })?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn save_file(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            what: "calibration".to_string(),
            source: e,
        })?;
        fs::write(path, content).map_err(|e| ConfigError::io(path, e))
    }

    /// Re-derive calibration from spreads measured on a labeled reference corpus.
    ///
    /// Direction follows the sign of `ai_mean - human_mean`. Each outer zone's
    /// confidence is the share of reference samples falling in it whose label
    /// matches the zone's side (0.5 for an empty zone); zone 3 stays at 0.5.
    pub fn derive(
        version: &str,
        embedding_model: &str,
        dimensions: usize,
        human_spreads: &[f64],
        ai_spreads: &[f64],
    ) -> Result<Self, ConfigError> {
        let (human_mean, human_sigma) = population_stats(human_spreads).ok_or_else(|| {
            ConfigError::Invalid("calibration corpus needs at least one human sample".into())
        })?;
        let (ai_mean, ai_sigma) = population_stats(ai_spreads).ok_or_else(|| {
            ConfigError::Invalid("calibration corpus needs at least one AI sample".into())
        })?;

        let direction = if ai_mean > human_mean {
            SpreadDirection::HigherIsAi
        } else if ai_mean < human_mean {
            SpreadDirection::HigherIsHuman
        } else {
            return Err(ConfigError::Invalid(
                "human and AI spreads have the same mean; no direction to calibrate".into(),
            ));
        };

        let mut thresholds = Self {
            version: version.to_string(),
            embedding_model: embedding_model.to_string(),
            dimensions,
            direction,
            human_mean,
            human_sigma,
            ai_mean,
            ai_sigma,
            zones: REFERENCE_SOFT_SCORES.map(|soft_score| ZoneCalibration {
                confidence: 0.5,
                soft_score,
            }),
        };
        thresholds.validate()?;

        // (matching, total) per zone
        let mut tally = [(0usize, 0usize); 5];
        let labeled = human_spreads
            .iter()
            .map(|s| (*s, false))
            .chain(ai_spreads.iter().map(|s| (*s, true)));
        for (spread, is_ai) in labeled {
            let idx = thresholds.zone_index(spread);
            let zone_is_ai = idx < MIXED_ZONE;
            tally[idx].1 += 1;
            if idx != MIXED_ZONE && zone_is_ai == is_ai {
                tally[idx].0 += 1;
            }
        }
        for (idx, (matching, total)) in tally.iter().enumerate() {
            if idx == MIXED_ZONE || *total == 0 {
                continue;
            }
            thresholds.zones[idx].confidence = *matching as f64 / *total as f64;
        }

        Ok(thresholds)
    }
}

fn population_stats(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
