//! The chat turn state machine.
//!
//! One call to [`ChatPipeline::chat`] drives a single turn through
//! generation, validation, execution and parsing, with a bounded
//! self-correction loop: validation rejections and runtime errors regenerate
//! with an error context attached, everything else ends the turn.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::ChatContext;
use crate::error::{ChatError, TurnFailure};
use crate::execution::{CodeRunner, ExecutionOutcome, ExecutionRequest};
use crate::llm::GenerativeBackend;
use crate::prompt::{build_chat_prompt, ErrorContext};
use crate::response::{self, ChatResponse, DataframePresenter};
use crate::sandbox::{clean_code, WhitelistPolicy};

pub struct ChatPipeline {
    backend: Arc<dyn GenerativeBackend>,
    runner: Arc<dyn CodeRunner>,
    presenter: Option<Arc<dyn DataframePresenter>>,
}

impl ChatPipeline {
    pub fn new(backend: Arc<dyn GenerativeBackend>, runner: Arc<dyn CodeRunner>) -> Self {
        Self { backend, runner, presenter: None }
    }

    /// Register a presentation hook for dataframe results.
    pub fn with_presenter(mut self, presenter: Arc<dyn DataframePresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Run one chat turn. The outcome (either way) is appended to the
    /// context's conversation memory exactly once.
    pub async fn chat(
        &self,
        context: &mut ChatContext,
        query: &str,
    ) -> Result<ChatResponse, TurnFailure> {
        let result = self.run_turn(context, query).await;
        match &result {
            Ok(response) => context.memory.add(query, response.render(), true),
            Err(failure) => context.memory.add(query, failure.message(), false),
        }
        result
    }

    async fn run_turn(
        &self,
        context: &mut ChatContext,
        query: &str,
    ) -> Result<ChatResponse, TurnFailure> {
        let policy = WhitelistPolicy::from_config(&context.config);
        let max_retries = context.config.max_retries;

        let fingerprint = context
            .cache
            .fingerprint(query, context.dataframes(), &context.config)
            .map_err(|e| TurnFailure {
                error: ChatError::Dataset(e.to_string()),
                last_code: None,
                attempts: 0,
            })?;

        let mut attempts = 0usize;
        let mut error_context: Option<ErrorContext> = None;
        let mut last_code: Option<String> = None;

        let fail = |error: ChatError, last_code: &Option<String>, attempts: usize| TurnFailure {
            error,
            last_code: last_code.clone(),
            attempts,
        };

        let raw_result = loop {
            // GENERATING: the cache only short-circuits a clean first attempt;
            // self-correction always goes back to the backend.
            let code = match (&error_context, context.cache.get(&fingerprint)) {
                (None, Some(cached)) => {
                    info!(%fingerprint, "cache hit, skipping code generation");
                    cached
                }
                _ => {
                    let prompt = build_chat_prompt(context, query, error_context.as_ref())
                        .map_err(|e| {
                            fail(ChatError::Dataset(e.to_string()), &last_code, attempts)
                        })?;
                    debug!(attempts, prompt_len = prompt.len(), "requesting code generation");
                    let generated = self
                        .backend
                        .generate(&prompt)
                        .await
                        .map_err(|e| fail(e, &last_code, attempts))?;
                    clean_code(&generated)
                }
            };
            last_code = Some(code.clone());
            context.add("last_code_generated", json!(code.clone()));

            // VALIDATING
            if let Err(rejection) = policy.validate(&code) {
                warn!(error = %rejection, "generated code rejected");
                if attempts < max_retries {
                    attempts += 1;
                    error_context = Some(ErrorContext {
                        code,
                        kind: "ValidationError".into(),
                        message: rejection.to_string(),
                    });
                    continue;
                }
                return Err(fail(rejection, &last_code, attempts));
            }

            // EXECUTING
            let request = ExecutionRequest::from_context(context, &code)
                .map_err(|e| fail(ChatError::Dataset(e.to_string()), &last_code, attempts))?;
            match self.runner.run(&request).await {
                Ok(ExecutionOutcome::Success(raw)) => {
                    // Only code that both validated and ran lands in the cache.
                    if let Err(e) = context.cache.set(&fingerprint, &code) {
                        warn!(error = %e, "failed to write code cache");
                    }
                    break raw;
                }
                Ok(ExecutionOutcome::Error { kind, message }) => {
                    warn!(%kind, %message, "generated code failed at runtime");
                    let error = ChatError::Execution { kind: kind.clone(), message: message.clone() };
                    if attempts < max_retries {
                        attempts += 1;
                        error_context = Some(ErrorContext { code, kind, message });
                        continue;
                    }
                    return Err(fail(error, &last_code, attempts));
                }
                // Timeouts and harness failures are terminal.
                Err(fatal) => return Err(fail(fatal, &last_code, attempts)),
            }
        };

        // Parsing failures are terminal: the code ran, its declared result
        // just violates the contract.
        let parsed = response::parse(&raw_result, &context.config, self.presenter.as_deref())
            .map_err(|e| fail(e, &last_code, attempts))?;
        info!(result_type = parsed.type_name(), attempts, "chat turn succeeded");
        Ok(parsed)
    }
}
