use async_trait::async_trait;

use crate::{Request, Response};
use reqflow_types::ReqflowError;

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, ReqflowError>;

    /// Embeds `text` into a dense vector. Providers without an embedding
    /// endpoint report the capability as unavailable.
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ReqflowError> {
        Err(ReqflowError::CapabilityUnavailable(format!(
            "{} embeddings",
            self.name()
        )))
    }

    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_tools(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, ReqflowError> {
        self.0.complete(request).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
        self.0.embed(text).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_tools(&self) -> bool {
        self.0.supports_tools()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
