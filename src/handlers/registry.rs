//! Custom-code registry interface.
//!
//! The full catalog of concrete steps (text analysis, business logic, …) is
//! owned by the embedding application. This module defines the registration
//! interface — a name-to-constructor lookup with schema validation by
//! deserialization — plus two illustrative steps so the test suite has
//! something to register.

use crate::error::HandlerError;
use crate::resources::Resources;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single custom-code step. `Input`/`Output` are the typed shapes; schema
/// validation *is* deserialization — a malformed call site fails with
/// [`HandlerError::Code`] carrying the `serde_json` error.
#[async_trait]
pub trait CodeStep: Send + Sync {
    type Input: DeserializeOwned + Send;
    type Output: Serialize + Send;

    async fn execute(&self, input: Self::Input, resources: &Resources) -> Result<Self::Output, String>;
}

/// Type-erased wrapper so heterogeneous [`CodeStep`]s can share one registry.
#[async_trait]
trait ErasedCodeStep: Send + Sync {
    async fn execute_erased(&self, input: Value, resources: &Resources) -> Result<Value, HandlerError>;
}

struct Erased<S>(S);

#[async_trait]
impl<S> ErasedCodeStep for Erased<S>
where
    S: CodeStep,
{
    async fn execute_erased(&self, input: Value, resources: &Resources) -> Result<Value, HandlerError> {
        let typed: S::Input =
            serde_json::from_value(input).map_err(|source| HandlerError::Code {
                name: std::any::type_name::<S>().to_string(),
                source,
            })?;
        let output = self
            .0
            .execute(typed, resources)
            .await
            .map_err(HandlerError::Custom)?;
        serde_json::to_value(output).map_err(|e| HandlerError::Code {
            name: std::any::type_name::<S>().to_string(),
            source: e,
        })
    }
}

/// A process-global mapping from `function_name` to registered step.
#[derive(Default, Clone)]
pub struct CodeStepRegistry {
    steps: HashMap<String, Arc<dyn ErasedCodeStep>>,
}

impl CodeStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S>(&mut self, function_name: impl Into<String>, step: S)
    where
        S: CodeStep + 'static,
    {
        self.steps
            .insert(function_name.into(), Arc::new(Erased(step)));
    }

    pub async fn invoke(
        &self,
        function_name: &str,
        input: Value,
        resources: &Resources,
    ) -> Result<Value, HandlerError> {
        let step = self
            .steps
            .get(function_name)
            .ok_or_else(|| HandlerError::UnregisteredCodeStep(function_name.to_string()))?;
        step.execute_erased(input, resources).await
    }
}

pub mod builtins {
    //! Illustrative steps exercised by the test suite; not the catalog.

    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub struct TextStatsInput {
        pub text: String,
    }

    #[derive(Serialize)]
    pub struct TextStatsOutput {
        pub word_count: usize,
        pub char_count: usize,
    }

    pub struct GetTextStats;

    #[async_trait]
    impl CodeStep for GetTextStats {
        type Input = TextStatsInput;
        type Output = TextStatsOutput;

        async fn execute(
            &self,
            input: Self::Input,
            _resources: &Resources,
        ) -> Result<Self::Output, String> {
            Ok(TextStatsOutput {
                word_count: input.text.split_whitespace().count(),
                char_count: input.text.chars().count(),
            })
        }
    }

    #[derive(Deserialize)]
    pub struct LengthClassifierInput {
        pub wc: usize,
    }

    #[derive(Serialize)]
    pub struct LengthClassifierOutput {
        pub bucket: String,
    }

    pub struct LengthClassifier;

    #[async_trait]
    impl CodeStep for LengthClassifier {
        type Input = LengthClassifierInput;
        type Output = LengthClassifierOutput;

        async fn execute(
            &self,
            input: Self::Input,
            _resources: &Resources,
        ) -> Result<Self::Output, String> {
            let bucket = if input.wc <= 5 { "short" } else { "long" };
            Ok(LengthClassifierOutput {
                bucket: bucket.to_string(),
            })
        }
    }
}
