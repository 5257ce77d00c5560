use std::collections::HashMap;

use reqflow_types::ReqflowError;

use crate::{DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    default_provider: Option<String>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
            middleware: Vec::new(),
        }
    }

    /// Registers a provider. The first one registered becomes the default.
    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, ReqflowError> {
        let provider = self.resolve_provider(request.provider.as_deref())?;
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    /// Embeds `text` with the default provider.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
        let provider = self.resolve_provider(None)?;
        tracing::debug!(provider = provider.name(), chars = text.len(), "LLM embed");
        provider.embed(text).await
    }

    fn resolve_provider(&self, name: Option<&str>) -> Result<&DynProvider, ReqflowError> {
        if let Some(provider_name) = name {
            return self.providers.get(provider_name).ok_or_else(|| {
                ReqflowError::CapabilityUnavailable(format!(
                    "provider '{provider_name}' not registered"
                ))
            });
        }

        self.default_provider
            .as_deref()
            .and_then(|n| self.providers.get(n))
            .ok_or_else(|| ReqflowError::CapabilityUnavailable("llm".to_string()))
    }

    /// Create from environment variables (detect available API keys).
    pub fn from_env() -> Result<Self, ReqflowError> {
        let mut client = Self::new().with_middleware(LoggingMiddleware);

        let adapter = crate::GeminiAdapter::from_env().map_err(|_| {
            ReqflowError::CapabilityUnavailable(
                "no LLM provider API key found in environment".to_string(),
            )
        })?;
        client.register_provider(adapter);

        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockProvider {
        name: &'static str,
        call_count: Arc<AtomicUsize>,
    }

    impl MockProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, ReqflowError> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            Ok(Response {
                id: "mock-resp".into(),
                text: format!("{} saw {} messages", self.name, request.messages.len()),
                tool_calls: vec![],
                usage: Usage::default(),
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
            Ok(vec![text.len() as f32])
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_tools(&self) -> bool {
            true
        }
    }

    struct TagMiddleware;

    impl Middleware for TagMiddleware {
        fn before(&self, request: &mut Request) {
            request.model = "tagged".into();
        }

        fn after(&self, _request: &Request, response: &mut Response) {
            response.text.push_str(" [seen]");
        }
    }

    #[tokio::test]
    async fn empty_client_reports_unavailable() {
        let client = LlmClient::new();
        assert!(!client.has_providers());
        let err = client.complete(&Request::prompt("hi", None)).await.unwrap_err();
        assert!(matches!(err, ReqflowError::CapabilityUnavailable(_)));
    }

    #[tokio::test]
    async fn first_registered_provider_is_default() {
        let mut client = LlmClient::new();
        let first = MockProvider::new("first");
        let count = first.call_count.clone();
        client.register_provider(first);
        client.register_provider(MockProvider::new("second"));

        let resp = client.complete(&Request::prompt("hi", None)).await.unwrap();
        assert!(resp.text.starts_with("first"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn explicit_provider_is_honored() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::new("first"));
        client.register_provider(MockProvider::new("second"));

        let mut req = Request::prompt("hi", None);
        req.provider = Some("second".into());
        let resp = client.complete(&req).await.unwrap();
        assert!(resp.text.starts_with("second"));

        req.provider = Some("missing".into());
        assert!(client.complete(&req).await.is_err());
    }

    #[tokio::test]
    async fn middleware_runs_before_and_after() {
        let mut client = LlmClient::new().with_middleware(TagMiddleware);
        client.register_provider(MockProvider::new("mock"));

        let resp = client.complete(&Request::prompt("hi", None)).await.unwrap();
        assert_eq!(resp.model, "tagged");
        assert!(resp.text.ends_with("[seen]"));
    }

    #[tokio::test]
    async fn embed_uses_default_provider() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::new("mock"));
        assert_eq!(client.embed("abcd").await.unwrap(), vec![4.0]);
    }
}
