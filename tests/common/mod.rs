use async_trait::async_trait;
use loomgraph::handlers::registry::CodeStep;
use loomgraph::resources::{HttpResponse, HttpTransport, LanguageModelClient, PromptPart, Resources};
use serde_json::Value;

pub struct ConstantStep(pub Value);

#[async_trait]
impl CodeStep for ConstantStep {
    type Input = Value;
    type Output = Value;

    async fn execute(&self, _input: Value, _resources: &Resources) -> Result<Value, String> {
        Ok(self.0.clone())
    }
}

pub struct SumStep;

#[async_trait]
impl CodeStep for SumStep {
    type Input = Value;
    type Output = Value;

    async fn execute(&self, input: Value, _resources: &Resources) -> Result<Value, String> {
        let a = input.get("a").and_then(Value::as_f64).unwrap_or(0.0);
        let b = input.get("b").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "sum": a + b }))
    }
}

pub struct FailingStep(pub String);

#[async_trait]
impl CodeStep for FailingStep {
    type Input = Value;
    type Output = Value;

    async fn execute(&self, _input: Value, _resources: &Resources) -> Result<Value, String> {
        Err(self.0.clone())
    }
}

/// Echoes the uppercased text of the first prompt part, as JSON — used to
/// exercise map-over-list without depending on call order.
pub struct UppercaseEchoClient;

#[async_trait]
impl LanguageModelClient for UppercaseEchoClient {
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<Value, String> {
        let text = parts
            .iter()
            .find_map(|p| match p {
                PromptPart::Text(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(serde_json::json!({ "transformed": text.to_uppercase() }))
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

pub struct UnreachableLlmClient;

#[async_trait]
impl LanguageModelClient for UnreachableLlmClient {
    async fn generate(&self, _parts: Vec<PromptPart>) -> Result<Value, String> {
        Err("llm client not configured for this test".to_string())
    }
}
