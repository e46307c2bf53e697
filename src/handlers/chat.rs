//! One-shot question handler.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::cache::CodeCache;
use crate::config::{Config, PipelineConfig};
use crate::context::ChatContext;
use crate::dataframe::DataFrame;
use crate::execution::python::PythonRunner;
use crate::llm::LlmClient;
use crate::pipeline::ChatPipeline;

use super::{print_failure, print_response};

pub struct ChatHandler;

impl ChatHandler {
    pub async fn run(cfg: &Config, query: &str, files: &[String]) -> Result<()> {
        let mut ctx = build_context(cfg, files)?;
        let pipeline = build_pipeline(cfg, &ctx.config)?;

        match pipeline.chat(&mut ctx, query).await {
            Ok(response) => {
                print_response(&response);
                Ok(())
            }
            Err(failure) => {
                print_failure(&failure);
                bail!("chat turn failed: {}", failure.message())
            }
        }
    }
}

pub(super) fn build_context(cfg: &Config, files: &[String]) -> Result<ChatContext> {
    if files.is_empty() {
        bail!("no dataset bound; pass at least one --file");
    }
    let mut dfs = Vec::with_capacity(files.len());
    for path in files {
        dfs.push(DataFrame::from_file(path)?);
    }
    let pipeline_config = PipelineConfig::from_config(cfg);
    let cache = CodeCache::from_config(cfg);
    Ok(ChatContext::new(dfs, pipeline_config, cache))
}

pub(super) fn build_pipeline(cfg: &Config, pipeline_config: &PipelineConfig) -> Result<ChatPipeline> {
    let backend = Arc::new(LlmClient::from_config(cfg)?);
    let runner = Arc::new(PythonRunner::from_config(cfg, pipeline_config));
    Ok(ChatPipeline::new(backend, runner))
}
