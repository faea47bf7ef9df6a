//! Deterministic stand-ins for exercising runs without a real provider.
//!
//! This module provides:
//! - [`ScriptedGateway`], a reasoning gateway with per-role scripted replies
//! - [`StaticRetriever`], a knowledge retriever with fixed snippets
//! - Registry fixtures for common pipeline shapes

mod fixtures;
mod gateway;

pub use fixtures::{linear_registry, rejection_gated_registry, score_gated_registry};
pub use gateway::{GatewayCall, ScriptedGateway, StaticRetriever};
