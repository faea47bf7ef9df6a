//! Composes full task text for a stage invocation.

use super::PromptBuilder;
use crate::context::RunContext;
use crate::gateway::KnowledgeSnippet;
use crate::signals::RejectionCategory;
use std::fmt::Write;

/// An extra instruction appended for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Re-attempt a rejected stage.
    Pivot {
        /// Category of the rejection being pivoted away from.
        category: RejectionCategory,
        /// The rejected output.
        rejected: String,
    },
    /// Revise a draft after critique.
    Revise {
        /// The previous draft.
        draft: String,
        /// The critique of that draft.
        critique: String,
        /// Score the critique assigned, if any.
        score: Option<u8>,
        /// The score needed to pass.
        threshold: u8,
    },
    /// Critique a draft and score it.
    Review {
        /// The draft under review.
        draft: String,
        /// The score needed to pass.
        threshold: u8,
    },
}

/// Builds task text from the run context and a stage's own instructions.
///
/// Composition never fails. Missing prior outputs are noted inline and the
/// rest of the context is still provided.
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    /// Upper bound on characters quoted from each prior output; 0 disables it.
    max_prior_chars: usize,
}

impl PromptComposer {
    /// Creates a composer with no truncation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncates each quoted prior output to `chars` characters.
    #[must_use]
    pub fn with_max_prior_chars(mut self, chars: usize) -> Self {
        self.max_prior_chars = chars;
        self
    }

    /// Composes the task text for one invocation.
    #[must_use]
    pub fn compose(
        &self,
        ctx: &RunContext,
        prompt: &dyn PromptBuilder,
        knowledge: &[KnowledgeSnippet],
        directive: Option<&Directive>,
    ) -> String {
        let mut out = String::new();

        section(&mut out, "Brief");
        out.push_str(ctx.seed.trim());
        out.push('\n');

        if !prompt.requires().is_empty() {
            section(&mut out, "Prior Work");
            for key in prompt.requires() {
                match ctx.output(key) {
                    Some(text) => {
                        let _ = writeln!(out, "### {key}\n{}", self.clip(text));
                    }
                    None => {
                        let _ = writeln!(out, "### {key}\n(not available)");
                    }
                }
            }
        }

        if !ctx.constraints.is_empty() {
            section(&mut out, "Locked Constraints");
            for (name, value) in ctx.constraints.iter() {
                let _ = writeln!(out, "- {name}: {value} (do not change)");
            }
        }

        if !knowledge.is_empty() {
            section(&mut out, "Reference Material");
            for snippet in knowledge {
                match &snippet.source_id {
                    Some(source) => {
                        let _ = writeln!(out, "- [{source}] {}", snippet.text.trim());
                    }
                    None => {
                        let _ = writeln!(out, "- {}", snippet.text.trim());
                    }
                }
            }
        }

        section(&mut out, "Task");
        out.push_str(prompt.build(ctx).trim());
        out.push('\n');

        let directives = standing_directives(ctx);
        if !directives.is_empty() {
            section(&mut out, "Standing Directives");
            for line in directives {
                let _ = writeln!(out, "- {line}");
            }
        }

        if let Some(directive) = directive {
            render_directive(&mut out, directive);
        }

        out
    }

    fn clip<'a>(&self, text: &'a str) -> &'a str {
        if self.max_prior_chars == 0 {
            return text;
        }
        match text.char_indices().nth(self.max_prior_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

fn section(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "## {title}");
}

fn standing_directives(ctx: &RunContext) -> Vec<String> {
    let options = &ctx.options;
    let mut lines = Vec::new();
    if let Some(audience) = &options.audience {
        lines.push(format!("Audience: {audience}"));
    }
    if let Some(horizon) = &options.delivery_horizon {
        lines.push(format!("Delivery horizon: {horizon}"));
    }
    if let Some(lock) = &options.creative_lock {
        lines.push(format!("Creative lock: {lock}"));
    }
    if let Some(directive) = &options.directive {
        lines.push(format!("Directive: {directive}"));
    }
    lines
}

fn render_directive(out: &mut String, directive: &Directive) {
    match directive {
        Directive::Pivot { category, rejected } => {
            section(out, "Pivot Directive");
            let _ = writeln!(
                out,
                "The previous attempt was rejected ({category}). Propose the closest valid \
                 alternative that preserves intent.\n\nRejected attempt:\n{}",
                rejected.trim()
            );
        }
        Directive::Revise {
            draft,
            critique,
            score,
            threshold,
        } => {
            section(out, "Revision Directive");
            let scored = score.map_or_else(|| "unscored".to_string(), |s| format!("{s}/100"));
            let _ = writeln!(
                out,
                "Revise the previous draft to address the critique. It scored {scored}; \
                 the target is {threshold}/100.\n\nPrevious draft:\n{}\n\nCritique:\n{}",
                draft.trim(),
                critique.trim()
            );
        }
        Directive::Review { draft, threshold } => {
            section(out, "Draft Under Review");
            let _ = writeln!(
                out,
                "{}\n\nCritique the draft above. The passing score is {threshold}/100. \
                 End with a line of the form `Score: N/100`.",
                draft.trim()
            );
        }
    }
}
