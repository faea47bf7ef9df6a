//! Per-stage prompt builders.

use crate::context::RunContext;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(?:(seed)|output:([A-Za-z0-9_.\-]+)|constraint:([A-Za-z0-9_.\-]+))\}").unwrap()
});

/// Produces a stage's instructions from the run so far.
pub trait PromptBuilder: Send + Sync {
    /// Builds the stage instructions. Must not fail; missing inputs degrade.
    fn build(&self, ctx: &RunContext) -> String;

    /// Output keys the composer should include as prior work.
    fn requires(&self) -> &[String] {
        &[]
    }

    /// Every output key this builder reads, for registry validation.
    fn references(&self) -> Vec<String> {
        self.requires().to_vec()
    }
}

/// A text template with `{seed}`, `{output:key}` and `{constraint:name}` placeholders.
///
/// Unknown outputs and constraints render as `(not available)`.
#[derive(Debug, Clone)]
pub struct TemplatePrompt {
    template: String,
    requires: Vec<String>,
}

impl TemplatePrompt {
    /// Creates a template prompt.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            requires: Vec::new(),
        }
    }

    /// Declares prior outputs to include as context.
    #[must_use]
    pub fn with_requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Returns the raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    fn placeholder_keys(&self) -> impl Iterator<Item = &str> {
        PLACEHOLDER_REGEX
            .captures_iter(&self.template)
            .filter_map(|cap| cap.get(2).map(|m| m.as_str()))
    }
}

impl PromptBuilder for TemplatePrompt {
    fn build(&self, ctx: &RunContext) -> String {
        PLACEHOLDER_REGEX
            .replace_all(&self.template, |cap: &Captures<'_>| {
                if cap.get(1).is_some() {
                    return ctx.seed.clone();
                }
                let value = if let Some(key) = cap.get(2) {
                    ctx.output(key.as_str())
                } else {
                    cap.get(3).and_then(|name| ctx.constraints.get(name.as_str()))
                };
                value.unwrap_or("(not available)").to_string()
            })
            .into_owned()
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }

    fn references(&self) -> Vec<String> {
        let mut keys = self.requires.clone();
        for key in self.placeholder_keys() {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }
}

/// Adapts a closure into a [`PromptBuilder`].
pub struct FnPrompt<F> {
    build: F,
    requires: Vec<String>,
}

impl<F> FnPrompt<F>
where
    F: Fn(&RunContext) -> String + Send + Sync,
{
    /// Creates a closure-backed prompt.
    #[must_use]
    pub fn new(build: F) -> Self {
        Self {
            build,
            requires: Vec::new(),
        }
    }

    /// Declares prior outputs to include as context.
    #[must_use]
    pub fn with_requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(keys.into_iter().map(Into::into));
        self
    }
}

impl<F> PromptBuilder for FnPrompt<F>
where
    F: Fn(&RunContext) -> String + Send + Sync,
{
    fn build(&self, ctx: &RunContext) -> String {
        (self.build)(ctx)
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }
}

impl<F> fmt::Debug for FnPrompt<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPrompt")
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunOptions;
    use uuid::Uuid;

    fn context() -> RunContext {
        let mut ctx = RunContext::new(Uuid::new_v4(), "Autumn lamp launch", RunOptions::default());
        ctx.record_output("concept", "Evenings that glow").unwrap();
        ctx.constraints.set_if_absent("primary_entity", "Lumen");
        ctx
    }

    #[test]
    fn test_template_placeholders() {
        let prompt = TemplatePrompt::new(
            "Seed: {seed}\nConcept: {output:concept}\nBrand: {constraint:primary_entity}",
        );
        let text = prompt.build(&context());
        assert_eq!(
            text,
            "Seed: Autumn lamp launch\nConcept: Evenings that glow\nBrand: Lumen"
        );
    }

    #[test]
    fn test_template_missing_values_degrade() {
        let prompt = TemplatePrompt::new("Outline: {output:outline} / {constraint:tone}");
        assert_eq!(
            prompt.build(&context()),
            "Outline: (not available) / (not available)"
        );
    }

    #[test]
    fn test_template_references_include_placeholders() {
        let prompt = TemplatePrompt::new("Use {output:outline} and {output:concept}")
            .with_requires(["concept"]);
        assert_eq!(prompt.requires(), ["concept"]);
        assert_eq!(prompt.references(), vec!["concept", "outline"]);
    }

    #[test]
    fn test_fn_prompt() {
        let prompt = FnPrompt::new(|ctx: &RunContext| format!("Seed has {} chars", ctx.seed.len()))
            .with_requires(["concept"]);
        assert_eq!(prompt.build(&context()), "Seed has 18 chars");
        assert_eq!(prompt.references(), vec!["concept"]);
    }
}
