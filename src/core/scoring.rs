//! Credit Scoring Module
//! Maps a `FeatureVector` onto a 0-1000 score, a risk label and a per-factor breakdown
//!
//! Two interchangeable strategies produce six bounded sub-scores:
//! - `RuleBasedScorer`: saturating rules, always available
//! - `TrainedScorer`: logistic sub-models loaded from a versioned JSON artifact
//!
//! Aggregation is shared, so both strategies honour the same contract:
//! `score ∈ [0, 1000]` and `Σ factor points == score`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::config::{FactorWeights, ModelSource, RiskThresholds, Saturation, ScoringConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{FeatureVector, RiskLevel, ScoreFactor, FEATURE_NAMES};

/// Version reported by the rule-based strategy
pub const RULES_VERSION: &str = "rules-v1";

/// Version reported when a configured artifact could not be used
pub const DEGRADED_VERSION: &str = "rules-v1+degraded";

/// Factor order shared by weights, sub-scores and the breakdown
pub const FACTOR_NAMES: [&str; 6] = [
    "account_age",
    "tx_activity",
    "balances",
    "defi",
    "staking",
    "governance",
];

/// Maximum total score
pub const MAX_SCORE: u16 = 1000;

/// Features whose presence counts towards confidence
const EVIDENCE_FEATURES: [&str; 9] = [
    "account_age_days",
    "tx_count",
    "tx_velocity",
    "unique_counterparties",
    "balance_diversity_index",
    "asset_count",
    "defi_interaction_count",
    "staking_ratio",
    "governance_participation",
];

// ============================================
// Strategy trait
// ============================================

/// Produces one sub-score in [0, 1] per factor (`FACTOR_NAMES` order)
pub trait ScoringStrategy: Send + Sync {
    fn version(&self) -> &str;

    fn sub_scores(&self, features: &FeatureVector) -> [f64; 6];

    /// Self-reported certainty multiplied into confidence
    fn certainty(&self) -> f64 {
        1.0
    }
}

/// Saturating rules
pub struct RuleBasedScorer {
    saturation: Saturation,
    version: String,
}

impl RuleBasedScorer {
    pub fn new(saturation: Saturation) -> Self {
        Self {
            saturation,
            version: RULES_VERSION.to_string(),
        }
    }

    fn degraded(saturation: Saturation) -> Self {
        Self {
            saturation,
            version: DEGRADED_VERSION.to_string(),
        }
    }
}

fn ratio(value: f64, saturation: f64) -> f64 {
    if !value.is_finite() || saturation <= 0.0 {
        return 0.0;
    }
    (value / saturation).clamp(0.0, 1.0)
}

impl ScoringStrategy for RuleBasedScorer {
    fn version(&self) -> &str {
        &self.version
    }

    fn sub_scores(&self, f: &FeatureVector) -> [f64; 6] {
        let sat = &self.saturation;
        // Log-scaled volume, half of the activity factor
        let volume = ((1.0 + f.tx_count.max(0.0)).log10() / (1.0 + sat.tx_count).log10()).clamp(0.0, 1.0);
        [
            ratio(f.account_age_days, sat.account_age_days),
            0.5 * volume + 0.5 * ratio(f.tx_velocity, sat.tx_velocity),
            ratio(f.balance_diversity_index, sat.balance_diversity),
            ratio(f.defi_interaction_count, sat.defi_protocols),
            ratio(f.staking_ratio, sat.staking_ratio),
            ratio(f.governance_participation, sat.governance_participation),
        ]
    }
}

// ============================================
// Trained artifact
// ============================================

/// Standard scaler fitted offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Logistic sub-model for one factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    pub name: String,
    pub intercept: f64,
    pub weights: Vec<f64>,
}

/// Versioned model artifact produced by offline training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    pub scaler: Scaler,
    pub factors: Vec<FactorModel>,
    #[serde(default = "default_certainty")]
    pub certainty: f64,
}

fn default_certainty() -> f64 {
    1.0
}

impl ModelArtifact {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let artifact: Self = serde_json::from_str(raw).map_err(|e| {
            AppError::with_source(ErrorCode::ModelArtifactCorrupt, "Model artifact is not valid JSON", e)
        })?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Schema and shape checks against the compiled feature schema
    pub fn validate(&self) -> AppResult<()> {
        let corrupt = |msg: String| AppError::new(ErrorCode::ModelArtifactCorrupt, msg);

        if self.version.trim().is_empty() {
            return Err(corrupt("artifact version is empty".to_string()));
        }
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(corrupt(format!(
                "artifact feature schema {:?} does not match {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        let n = FEATURE_NAMES.len();
        if self.scaler.mean.len() != n || self.scaler.scale.len() != n {
            return Err(corrupt(format!("scaler must have {} entries", n)));
        }
        if self.factors.iter().map(|f| f.name.as_str()).ne(FACTOR_NAMES.iter().copied()) {
            return Err(corrupt(format!("artifact factors must be {:?}", FACTOR_NAMES)));
        }
        if let Some(bad) = self.factors.iter().find(|f| f.weights.len() != n) {
            return Err(corrupt(format!("factor {} must have {} weights", bad.name, n)));
        }
        let all_finite = self
            .scaler
            .mean
            .iter()
            .chain(&self.scaler.scale)
            .chain(self.factors.iter().flat_map(|f| f.weights.iter().chain([&f.intercept])))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(corrupt("artifact contains non-finite numbers".to_string()));
        }
        if !(0.0..=1.0).contains(&self.certainty) {
            return Err(corrupt(format!("certainty {} outside [0, 1]", self.certainty)));
        }
        Ok(())
    }
}

/// Logistic sub-models over standardized features
pub struct TrainedScorer {
    artifact: ModelArtifact,
}

impl TrainedScorer {
    pub fn new(artifact: ModelArtifact) -> AppResult<Self> {
        artifact.validate()?;
        Ok(Self { artifact })
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ScoringStrategy for TrainedScorer {
    fn version(&self) -> &str {
        &self.artifact.version
    }

    fn sub_scores(&self, features: &FeatureVector) -> [f64; 6] {
        let scaler = &self.artifact.scaler;
        let z: Vec<f64> = features
            .values()
            .iter()
            .enumerate()
            .map(|(j, x)| {
                let scale = if scaler.scale[j].abs() > f64::EPSILON { scaler.scale[j] } else { 1.0 };
                (x - scaler.mean[j]) / scale
            })
            .collect();

        let mut out = [0.0; 6];
        for (slot, factor) in out.iter_mut().zip(&self.artifact.factors) {
            let logit = factor.intercept + factor.weights.iter().zip(&z).map(|(w, z)| w * z).sum::<f64>();
            *slot = sigmoid(logit).clamp(0.0, 1.0);
        }
        out
    }

    fn certainty(&self) -> f64 {
        self.artifact.certainty
    }
}

// ============================================
// Scoring model
// ============================================

/// Output of one scoring call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub score: u16,
    pub risk: RiskLevel,
    pub confidence: f64,
    pub factors: Vec<ScoreFactor>,
    pub model_version: String,
}

/// Loaded strategy plus the shared aggregation
pub struct ScoringModel {
    strategy: Box<dyn ScoringStrategy>,
    config: ScoringConfig,
    max_points: [i32; 6],
    loaded_at: DateTime<Utc>,
}

impl ScoringModel {
    pub fn new(strategy: Box<dyn ScoringStrategy>, config: ScoringConfig) -> Self {
        let max_points = apportion(&max_exact(&config.weights), &[i32::MAX; 6], MAX_SCORE as i32);
        Self {
            strategy,
            config,
            max_points,
            loaded_at: Utc::now(),
        }
    }

    pub fn rule_based(config: ScoringConfig) -> Self {
        let scorer = RuleBasedScorer::new(config.saturation.clone());
        Self::new(Box::new(scorer), config)
    }

    /// Cold-start load; a missing or corrupt artifact degrades to rules, never fails
    pub async fn load(source: &ModelSource, config: ScoringConfig) -> Self {
        if *source == ModelSource::None {
            info!("🧮 No model artifact configured, using {}", RULES_VERSION);
            return Self::rule_based(config);
        }

        let loaded = match fetch_artifact(source).await {
            Ok(artifact) => TrainedScorer::new(artifact),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(scorer) => {
                info!("🧠 Loaded model {} from {}", scorer.version(), source.describe());
                Self::new(Box::new(scorer), config)
            }
            Err(e) => {
                warn!(
                    "⚠️ [{}] Model unavailable from {}: {} - falling back to {}",
                    e.kind().as_str(),
                    source.describe(),
                    e,
                    DEGRADED_VERSION
                );
                let scorer = RuleBasedScorer::degraded(config.saturation.clone());
                Self::new(Box::new(scorer), config)
            }
        }
    }

    pub fn version(&self) -> &str {
        self.strategy.version()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_degraded(&self) -> bool {
        self.version() == DEGRADED_VERSION
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.config.thresholds
    }

    pub fn score(&self, features: &FeatureVector) -> ModelOutput {
        let evidence = evidence_ratio(features);
        // No observed activity earns no credit under any strategy
        let sub_scores = if evidence == 0.0 {
            [0.0; 6]
        } else {
            self.strategy.sub_scores(features)
        };

        let exact = factor_exact(&sub_scores, &self.config.weights);
        let total: f64 = exact.iter().sum();
        let score = (total.round() as i32).clamp(0, MAX_SCORE as i32);
        let points = apportion(&exact, &self.max_points, score);

        let factors = FACTOR_NAMES
            .iter()
            .zip(points.iter().zip(&self.max_points))
            .map(|(name, (points, max))| ScoreFactor {
                name: name.to_string(),
                points: *points,
                max_points: *max,
            })
            .collect();

        let confidence = (evidence * features.data_completeness.clamp(0.0, 1.0) * self.strategy.certainty())
            .clamp(0.0, 1.0);

        let score = score as u16;
        ModelOutput {
            score,
            risk: risk_level(score, &self.config.thresholds),
            confidence,
            factors,
            model_version: self.version().to_string(),
        }
    }
}

async fn fetch_artifact(source: &ModelSource) -> AppResult<ModelArtifact> {
    let raw = match source {
        ModelSource::None => {
            return Err(AppError::new(ErrorCode::ModelArtifactMissing, "no artifact configured"))
        }
        ModelSource::Local(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                ErrorCode::ModelArtifactMissing
            } else {
                ErrorCode::ModelArtifactCorrupt
            };
            AppError::with_source(code, format!("cannot read {}", path.display()), e)
        })?,
        ModelSource::Remote(url) => {
            let missing = |e: reqwest::Error| {
                AppError::with_source(ErrorCode::ModelArtifactMissing, "artifact download failed", e)
            };
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(missing)?;
            let response = client.get(url).send().await.map_err(missing)?;
            if !response.status().is_success() {
                return Err(AppError::new(
                    ErrorCode::ModelArtifactMissing,
                    format!("artifact download returned HTTP {}", response.status()),
                ));
            }
            response.text().await.map_err(missing)?
        }
    };
    ModelArtifact::from_json(&raw)
}

// ============================================
// Aggregation
// ============================================

/// Factor point bound before integer apportionment
fn max_exact(weights: &FactorWeights) -> [f64; 6] {
    factor_exact(&[1.0; 6], weights)
}

fn factor_exact(sub_scores: &[f64; 6], weights: &FactorWeights) -> [f64; 6] {
    let w = weights.as_array();
    let total = weights.total();
    let mut exact = [0.0; 6];
    for i in 0..6 {
        let sub = if sub_scores[i].is_finite() { sub_scores[i].clamp(0.0, 1.0) } else { 0.0 };
        exact[i] = sub * w[i] * MAX_SCORE as f64 / total;
    }
    exact
}

/// Largest-remainder rounding of `exact` onto integers summing to `target`,
/// never exceeding `caps`
fn apportion(exact: &[f64; 6], caps: &[i32; 6], target: i32) -> [i32; 6] {
    let mut points = [0i32; 6];
    for i in 0..6 {
        points[i] = (exact[i].floor() as i32).min(caps[i]);
    }

    let mut order: Vec<usize> = (0..6).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
    });

    let mut remaining = target - points.iter().sum::<i32>();
    while remaining > 0 {
        let before = remaining;
        for &i in &order {
            if remaining == 0 {
                break;
            }
            if points[i] < caps[i] {
                points[i] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    points
}

fn evidence_ratio(features: &FeatureVector) -> f64 {
    let present = EVIDENCE_FEATURES
        .iter()
        .filter(|name| features.get(name).is_some_and(|v| v.is_finite() && v != 0.0))
        .count();
    present as f64 / EVIDENCE_FEATURES.len() as f64
}

pub fn risk_level(score: u16, thresholds: &RiskThresholds) -> RiskLevel {
    if score >= thresholds.low {
        RiskLevel::Low
    } else if score >= thresholds.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}
