//! Shared helpers for pipeline integration tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use dfchat::cache::CodeCache;
use dfchat::config::PipelineConfig;
use dfchat::context::ChatContext;
use dfchat::dataframe::{table_from_columns, DataFrame};
use dfchat::error::ChatError;
use dfchat::execution::{CodeRunner, ExecutionOutcome, ExecutionRequest};

/// Runner that replays scripted outcomes and records every request.
pub struct ScriptedRunner {
    outcomes: Mutex<Vec<Result<ExecutionOutcome, ChatError>>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<Result<ExecutionOutcome, ChatError>>) -> Self {
        Self { outcomes: Mutex::new(outcomes), requests: Mutex::new(Vec::new()) }
    }

    pub fn succeeding(value: Value) -> Self {
        Self::new(vec![Ok(ExecutionOutcome::Success(value))])
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeRunner for ScriptedRunner {
    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() == 1 {
            outcomes[0].clone()
        } else {
            outcomes.remove(0)
        }
    }
}

/// The gdp/happiness sample used across the suite.
pub fn countries_df() -> DataFrame {
    let data = table_from_columns(vec![
        (
            "country",
            vec![json!("United States"), json!("France"), json!("Japan")],
        ),
        (
            "gdp",
            vec![json!(19294482071552i64), json!(2411255037952i64), json!(4380756541440i64)],
        ),
        ("happiness_index", vec![json!(6.94), json!(6.66), json!(5.87)]),
    ]);
    DataFrame::new("countries", data).with_description("gdp and happiness by country")
}

pub fn context_with(config: PipelineConfig) -> ChatContext {
    ChatContext::new(vec![countries_df()], config, CodeCache::disabled())
}

pub fn context() -> ChatContext {
    context_with(PipelineConfig::default())
}
