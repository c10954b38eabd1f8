//! Chainscore Library
//!
//! Multi-chain wallet credit scoring engine:
//! - Chain adapters for Sei, Ethereum and Solana with bounded retry
//! - Feature extraction over normalized on-chain activity
//! - Rule-based and trained scoring strategies with a degraded fallback
//! - TTL result cache with one computation in flight per wallet

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::features::FeatureExtractor;
pub use crate::core::orchestrator::{ChainHealth, HealthReport, ScoreOrchestrator, ScoreResponse};
pub use crate::core::scoring::{ModelArtifact, ScoringModel, ScoringStrategy};
pub use models::config::{AppConfig, CacheConfig, ModelSource, RetryPolicy, ScoringConfig};
pub use models::errors::{AppError, AppResult, ErrorCode, ErrorKind};
pub use models::types::{Chain, FeatureVector, RawActivityRecord, RiskLevel, ScoreBand, ScoreResult};
pub use providers::{AdapterRegistry, ChainAdapter};
pub use utils::cache::{CacheKey, CacheStats, ResultCache};
