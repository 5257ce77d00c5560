//! Capability seams for optional LLM features.
//!
//! Every analysis stage works without an LLM. Callers hold a [`Capabilities`]
//! bundle and either get real generation/embedding or the null variants, which
//! fail fast (generation) or return an empty vector (embedding).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqflow_types::ReqflowError;

use crate::{LlmClient, Request};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<String, ReqflowError>;

    fn is_available(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError>;

    fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// NullCapability
// ---------------------------------------------------------------------------

/// Stand-in used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCapability;

#[async_trait]
impl TextGenerator for NullCapability {
    async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String, ReqflowError> {
        Err(ReqflowError::CapabilityUnavailable("text generation".into()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[async_trait]
impl Embedder for NullCapability {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ReqflowError> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// LlmClient as a capability
// ---------------------------------------------------------------------------

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<String, ReqflowError> {
        let resp = self
            .complete(&Request::prompt(prompt, system_instruction))
            .await?;
        Ok(resp.text)
    }

    fn is_available(&self) -> bool {
        self.has_providers()
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
        LlmClient::embed(self, text).await
    }

    fn is_available(&self) -> bool {
        self.has_providers()
    }
}

// ---------------------------------------------------------------------------
// Bounded
// ---------------------------------------------------------------------------

/// Wraps a capability so every call is cut off after `timeout`.
pub struct Bounded<T: ?Sized> {
    inner: Arc<T>,
    timeout: Duration,
}

impl<T: ?Sized> Bounded<T> {
    pub fn new(inner: Arc<T>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    fn elapsed(&self) -> ReqflowError {
        ReqflowError::RequestTimeout {
            provider: "llm".into(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

#[async_trait]
impl TextGenerator for Bounded<dyn TextGenerator> {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<String, ReqflowError> {
        tokio::time::timeout(self.timeout, self.inner.generate(prompt, system_instruction))
            .await
            .map_err(|_| self.elapsed())?
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}

#[async_trait]
impl Embedder for Bounded<dyn Embedder> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
        tokio::time::timeout(self.timeout, self.inner.embed(text))
            .await
            .map_err(|_| self.elapsed())?
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The optional capabilities handed to the pipeline and agent.
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn Embedder>,
}

impl Capabilities {
    pub fn new(generator: Arc<dyn TextGenerator>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            generator,
            embedder,
        }
    }

    /// No LLM configured: generation fails fast, embedding yields empty vectors.
    pub fn none() -> Self {
        Self::new(Arc::new(NullCapability), Arc::new(NullCapability))
    }

    /// Uses `client` for both capabilities.
    pub fn from_client(client: Arc<LlmClient>) -> Self {
        Self::new(client.clone(), client)
    }

    /// Detects a provider from the environment, falling back to [`Capabilities::none`].
    pub fn from_env() -> Self {
        match LlmClient::from_env() {
            Ok(client) => Self::from_client(Arc::new(client)),
            Err(e) => {
                tracing::info!(reason = %e, "LLM capabilities disabled");
                Self::none()
            }
        }
    }

    /// Cuts off every capability call after `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            generator: Arc::new(Bounded::new(self.generator, timeout)),
            embedder: Arc::new(Bounded::new(self.embedder, timeout)),
        }
    }

    pub fn llm_available(&self) -> bool {
        self.generator.is_available()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("generator", &self.generator.is_available())
            .field("embedder", &self.embedder.is_available())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _p: &str, _s: Option<&str>) -> Result<String, ReqflowError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, p: &str, s: Option<&str>) -> Result<String, ReqflowError> {
            Ok(format!("{}|{}", s.unwrap_or("-"), p))
        }
    }

    #[tokio::test]
    async fn null_generation_is_unavailable() {
        let caps = Capabilities::none();
        assert!(!caps.llm_available());
        let err = caps.generator.generate("hi", None).await.unwrap_err();
        assert!(err.is_capability_failure());
    }

    #[tokio::test]
    async fn null_embedding_is_empty() {
        let caps = Capabilities::none();
        assert!(caps.embedder.embed("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bounded_generator_times_out() {
        let caps = Capabilities::new(Arc::new(SlowGenerator), Arc::new(NullCapability))
            .with_timeout(Duration::from_millis(50));
        let err = caps.generator.generate("hi", None).await.unwrap_err();
        assert!(matches!(
            err,
            ReqflowError::RequestTimeout { timeout_ms: 50, .. }
        ));
    }

    #[tokio::test]
    async fn bounded_generator_passes_through() {
        let caps = Capabilities::new(Arc::new(EchoGenerator), Arc::new(NullCapability))
            .with_timeout(Duration::from_secs(1));
        assert!(caps.llm_available());
        let out = caps.generator.generate("p", Some("s")).await.unwrap();
        assert_eq!(out, "s|p");
    }

    #[test]
    fn empty_client_is_not_available() {
        let caps = Capabilities::from_client(Arc::new(LlmClient::new()));
        assert!(!caps.llm_available());
    }
}
