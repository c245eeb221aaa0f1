//! Shared test helpers for planner tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use hearth_core::error::ProviderError;
use hearth_core::message::Message;
use hearth_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// One scripted provider outcome.
pub enum Scripted {
    Reply(String),
    Fail(String),
}

/// A mock provider that plays back scripted outcomes in order and records
/// every request it receives.
///
/// Once the script is exhausted every call fails.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(text)) => Ok(make_text_response(&text)),
            Some(Scripted::Fail(reason)) => Err(ProviderError::Network(reason)),
            None => Err(ProviderError::Network("connection refused".into())),
        }
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
