//! Gateway module - orchestration, rate limiting and provider administration

pub mod admin;
pub mod orchestrator;
pub mod rate_limit;

pub use admin::{CostStats, ProviderAdmin, RecentGeneration, ValidationReport};
pub use orchestrator::{
    GenerateImageRequest, GenerationOrchestrator, GenerationResult, InpaintImageRequest,
    ReloadSummary,
};
pub use rate_limit::{RateLimitWindow, RateLimiter};
