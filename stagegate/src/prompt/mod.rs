//! Stage prompt construction.
//!
//! This module provides:
//! - [`PromptBuilder`], the per-stage instruction source
//! - [`TemplatePrompt`] and [`FnPrompt`] builders
//! - [`PromptComposer`], which wraps stage instructions in run context

mod builder;
mod composer;

pub use builder::{FnPrompt, PromptBuilder, TemplatePrompt};
pub use composer::{Directive, PromptComposer};
