//! # sw-policy
//!
//! Confidence gateway for Style Warden.
//!
//! This crate provides the gateway configuration, operating modes, threshold
//! resolution, the confidence gateway itself, and the engine that composes
//! the reliability catalog, evidence scorer and gateway.

pub mod config;
pub mod engine;
pub mod gateway;
pub mod mode;
pub mod thresholds;

pub use config::{
    ensure_default_config, load_gateway_config, ConfigError, GatewayConfig, GatewaySettings,
};
pub use engine::ConfidenceEngine;
pub use gateway::{
    CategoryCounts, ConfidenceGateway, Decision, GatewayDecision, GatewayOutcome, GatewayReport,
    GatewayStats, ScoredCandidate,
};
pub use mode::{GatewayMode, ModeChange, ModeManager};
pub use thresholds::{NamedContext, ResolvedThreshold, ThresholdTable};
