//! Per-run chat context: bound datasets, config, memory, cache handle, and
//! the intermediate values stages hand to each other.

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::CodeCache;
use crate::config::PipelineConfig;
use crate::dataframe::DataFrame;
use crate::error::ChatError;

/// One completed turn as remembered by the conversation.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub query: String,
    /// Short human-readable rendering of the outcome.
    pub message: String,
    pub success: bool,
}

/// Append-only conversation history. Entries are added exactly once per
/// completed turn and never rewritten.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    entries: Vec<MemoryEntry>,
}

impl ConversationMemory {
    pub fn add(&mut self, query: impl Into<String>, message: impl Into<String>, success: bool) {
        self.entries.push(MemoryEntry {
            query: query.into(),
            message: message.into(),
            success,
        });
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns everything one chat turn needs. Exactly one run drives a context at
/// a time; concurrent turns get separate contexts.
pub struct ChatContext {
    dfs: Vec<DataFrame>,
    pub config: PipelineConfig,
    pub memory: ConversationMemory,
    pub cache: CodeCache,
    intermediate: HashMap<String, Value>,
}

impl ChatContext {
    pub fn new(dfs: Vec<DataFrame>, config: PipelineConfig, cache: CodeCache) -> Self {
        Self {
            dfs,
            config,
            memory: ConversationMemory::default(),
            cache,
            intermediate: HashMap::new(),
        }
    }

    pub fn dataframes(&self) -> &[DataFrame] {
        &self.dfs
    }

    pub fn dataframe(&self, index: usize) -> Result<&DataFrame, ChatError> {
        self.dfs.get(index).ok_or_else(|| {
            ChatError::Dataset(format!(
                "dataframe index {} out of range (bound: {})",
                index,
                self.dfs.len()
            ))
        })
    }

    /// Stage-to-stage scratch value, or `default` if the key was never set.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.intermediate.get(key).cloned().unwrap_or(default)
    }

    /// Store a scratch value; overwrites any previous value for the key.
    pub fn add(&mut self, key: impl Into<String>, value: Value) {
        self.intermediate.insert(key.into(), value);
    }
}
