//! The resource provider: external collaborators acquired once per run and
//! handed to every node, behind trait objects so transports stay swappable
//! (a mock in tests, a real client in production).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One part of a multimodal language-model prompt.
#[derive(Clone, Debug)]
pub enum PromptPart {
    Text(String),
    Media { mime_type: String, data: Vec<u8> },
}

/// Abstract language-model transport. The engine never speaks to a provider
/// directly; it calls through this trait so a test run can substitute a
/// canned client.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<Value, String>;
}

/// Abstract outbound HTTP transport for the `api` step kind.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Value,
        body: Value,
    ) -> Result<HttpResponse, String>;
}

pub struct HttpResponse {
    pub status: u16,
    pub json: Value,
    pub raw_body: String,
}

/// Optional storage handle, used only by custom-code steps that need it.
#[async_trait]
pub trait StorageHandle: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, String>;
    async fn put(&self, key: &str, value: Value) -> Result<(), String>;
}

/// Bundles every external collaborator a node handler may need, plus the
/// configuration for prompt/sub-workflow lookup.
#[derive(Clone)]
pub struct Resources {
    pub llm_client: Arc<dyn LanguageModelClient>,
    pub http_transport: Arc<dyn HttpTransport>,
    pub storage: Option<Arc<dyn StorageHandle>>,
    pub config: Arc<crate::config::EngineConfig>,
}

/// A [`HttpTransport`] backed by `reqwest`; the default used outside tests.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
}

impl ReqwestHttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Value,
        body: Value,
    ) -> Result<HttpResponse, String> {
        let method =
            reqwest::Method::from_bytes(method.as_bytes()).map_err(|e| e.to_string())?;
        let mut request = self.client.request(method, url);

        if let Value::Object(map) = &headers {
            for (k, v) in map {
                if let Some(v) = v.as_str() {
                    request = request.header(k, v);
                }
            }
        }
        if !body.is_null() {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let raw_body = response.text().await.map_err(|e| e.to_string())?;
        let json = serde_json::from_str(&raw_body).unwrap_or(Value::String(raw_body.clone()));

        Ok(HttpResponse {
            status,
            json,
            raw_body,
        })
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A language-model client that returns a fixed, pre-seeded response per
    /// call, in order. Used to exercise the llm handler without a real
    /// transport.
    pub struct ScriptedLlmClient {
        responses: Mutex<std::collections::VecDeque<Value>>,
    }

    impl ScriptedLlmClient {
        pub fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedLlmClient {
        async fn generate(&self, _parts: Vec<PromptPart>) -> Result<Value, String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| "scripted llm client exhausted".to_string())
        }
    }

    pub struct UnreachableHttpTransport;

    #[async_trait]
    impl HttpTransport for UnreachableHttpTransport {
        async fn request(
            &self,
            _method: &str,
            _url: &str,
            _headers: Value,
            _body: Value,
        ) -> Result<HttpResponse, String> {
            Err("http transport not configured for this test".to_string())
        }
    }
}
