//! External reasoning and knowledge interfaces.
//!
//! This module provides:
//! - [`ReasoningGateway`], the single seam through which stages reach a reasoning provider
//! - [`KnowledgeRetriever`], an optional source of reference snippets
//! - [`HttpGateway`] (feature `http`), a messages-style JSON client

#[cfg(feature = "http")]
mod http;
mod types;

#[cfg(feature = "http")]
pub use http::{HttpGateway, HttpGatewayConfig};
pub use types::{InvocationOptions, KnowledgeRetriever, KnowledgeSnippet, ReasoningGateway};
