//! Scripted gateway and retriever.

use crate::cancellation::CancellationToken;
use crate::errors::GatewayError;
use crate::gateway::{InvocationOptions, KnowledgeRetriever, KnowledgeSnippet, ReasoningGateway};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    /// The role description.
    pub role: String,
    /// The composed task text.
    pub task: String,
    /// Capability flags sent with the call.
    pub capabilities: Vec<String>,
}

/// A gateway that replays scripted responses per role.
///
/// Unscripted calls answer `"{role} output"`, so a run is deterministic
/// even without any script.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, GatewayError>>>>,
    calls: Mutex<Vec<GatewayCall>>,
    cancel_on: Mutex<Option<(usize, Arc<CancellationToken>)>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues replies for a role.
    #[must_use]
    pub fn with_responses<I, S>(self, role: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_responses(role, responses);
        self
    }

    /// Queues a failure for a role.
    #[must_use]
    pub fn with_failure(self, role: impl Into<String>, error: GatewayError) -> Self {
        self.scripts
            .lock()
            .entry(role.into())
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Cancels `token` while serving the `call`-th call (1-based).
    ///
    /// The call still returns its reply, as a real in-flight request would.
    #[must_use]
    pub fn cancel_on_call(self, call: usize, token: Arc<CancellationToken>) -> Self {
        *self.cancel_on.lock() = Some((call, token));
        self
    }

    /// Queues replies for a role in place.
    pub fn push_responses<I, S>(&self, role: impl Into<String>, responses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts
            .lock()
            .entry(role.into())
            .or_default()
            .extend(responses.into_iter().map(|r| Ok(r.into())));
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the calls made for one role.
    #[must_use]
    pub fn calls_for(&self, role: &str) -> Vec<GatewayCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.role == role)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ScriptedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedGateway")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReasoningGateway for ScriptedGateway {
    async fn invoke(
        &self,
        role: &str,
        task: &str,
        options: &InvocationOptions,
    ) -> Result<String, GatewayError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(GatewayCall {
                role: role.to_string(),
                task: task.to_string(),
                capabilities: options.capabilities.clone(),
            });
            calls.len()
        };

        if let Some((at, token)) = self.cancel_on.lock().as_ref() {
            if *at == call_number {
                token.cancel(format!("cancelled during call {call_number}"));
            }
        }

        self.scripts
            .lock()
            .get_mut(role)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(format!("{role} output")))
    }
}

/// A retriever returning fixed snippets.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    snippets: Vec<KnowledgeSnippet>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    /// Creates a retriever returning `snippets`.
    #[must_use]
    pub fn new(snippets: Vec<KnowledgeSnippet>) -> Self {
        Self {
            snippets,
            ..Self::default()
        }
    }

    /// Creates a retriever whose every search fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Returns the queries received.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl KnowledgeRetriever for StaticRetriever {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgeSnippet>, GatewayError> {
        self.queries.lock().push(query.to_string());
        if self.failing {
            return Err(GatewayError::transient("knowledge index unavailable"));
        }
        Ok(self.snippets.iter().take(top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let gateway = ScriptedGateway::new().with_responses("writer", ["first", "second"]);
        let opts = InvocationOptions::new();

        assert_eq!(gateway.invoke("writer", "t", &opts).await.unwrap(), "first");
        assert_eq!(gateway.invoke("writer", "t", &opts).await.unwrap(), "second");
        assert_eq!(gateway.invoke("writer", "t", &opts).await.unwrap(), "writer output");
        assert_eq!(gateway.invoke("editor", "t", &opts).await.unwrap(), "editor output");
        assert_eq!(gateway.calls_for("writer").len(), 3);
        assert_eq!(gateway.call_count(), 4);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let gateway = ScriptedGateway::new().with_failure("writer", GatewayError::rate_limited("429"));
        let err = gateway
            .invoke("writer", "t", &InvocationOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_on_call() {
        let token = Arc::new(CancellationToken::new());
        let gateway = ScriptedGateway::new().cancel_on_call(2, token.clone());
        let opts = InvocationOptions::new();

        gateway.invoke("a", "t", &opts).await.unwrap();
        assert!(!token.is_set());
        assert_eq!(gateway.invoke("b", "t", &opts).await.unwrap(), "b output");
        assert!(token.is_set());
    }

    #[tokio::test]
    async fn test_static_retriever() {
        let retriever = StaticRetriever::new(vec![
            KnowledgeSnippet::new("one", 0.9),
            KnowledgeSnippet::new("two", 0.5),
        ]);
        assert_eq!(retriever.search("q", 1).await.unwrap().len(), 1);
        assert_eq!(retriever.queries(), vec!["q".to_string()]);
    }

    #[test]
    fn test_failing_retriever() {
        let retriever = StaticRetriever::failing();
        assert!(tokio_test::block_on(retriever.search("q", 3)).is_err());
        assert_eq!(retriever.queries().len(), 1);
    }
}
