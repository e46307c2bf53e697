//! Execution engine: the runner seam and the payload handed to it.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::ChatContext;
use crate::error::ChatError;

pub mod python;

/// Rows and schema for one dataset as the harness receives them.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetPayload {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Everything one execution attempt needs. Built fresh per attempt from the
/// immutable dataset bindings, so generated code can never mutate what other
/// turns see.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub dfs: Vec<DatasetPayload>,
    pub direct_sql: bool,
    pub charts_dir: PathBuf,
}

impl ExecutionRequest {
    pub fn from_context(context: &ChatContext, code: &str) -> Result<Self> {
        let mut dfs = Vec::with_capacity(context.dataframes().len());
        for df in context.dataframes() {
            let data = df.execution_rows()?;
            dfs.push(DatasetPayload {
                name: df.name.clone(),
                columns: data.column_names(),
                rows: data.rows,
            });
        }
        Ok(Self {
            code: code.to_string(),
            dfs,
            direct_sql: context.config.direct_sql,
            charts_dir: context.config.charts_dir.clone(),
        })
    }
}

/// What running validated code produced.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The declared `result` payload, as JSON.
    Success(Value),
    /// A runtime failure the pipeline may retry.
    Error { kind: String, message: String },
}

/// Boundary between the pipeline and whatever actually runs the code.
///
/// The production implementation is [`python::PythonRunner`]; tests script
/// their own. A returned `Err` is terminal for the turn (timeouts land
/// here); an `Ok(Error { .. })` feeds the retry loop.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ChatError>;
}
