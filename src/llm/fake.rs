//! Scripted backend for tests and offline runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ChatError;

use super::GenerativeBackend;

/// Returns queued outputs in order; the last one repeats once the queue is
/// drained. Records every prompt it was given.
pub struct FakeBackend {
    outputs: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl FakeBackend {
    pub fn new(outputs: Vec<&str>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn single(output: &str) -> Self {
        Self::new(vec![output])
    }

    /// A backend that is down: every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            outputs: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(msg) = &self.fail_with {
            return Err(ChatError::Backend(msg.clone()));
        }
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.is_empty() {
            return Err(ChatError::Backend("fake backend has no output queued".into()));
        }
        if outputs.len() == 1 {
            Ok(outputs[0].clone())
        } else {
            Ok(outputs.remove(0))
        }
    }
}
