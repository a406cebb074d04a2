//! Test doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use dieah_agents::config::IndexBackend;
use dieah_agents::embedding::Embedder;
use dieah_agents::llm::{Completion, CompletionRequest, CompletionService, ToolCall};
use dieah_agents::storage::{FlatIndex, RecordCatalog};
use dieah_agents::{Config, Delegate, Error, LongTermMemory, MemoryManager, Result, SessionStore};

pub const DIMENSIONS: usize = 256;

/// Bag-of-words embedder: every lowercase word bumps one hashed dimension
pub struct BagOfWords;

impl BagOfWords {
    fn bucket(word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % DIMENSIONS as u64) as usize
    }
}

#[async_trait]
impl Embedder for BagOfWords {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[Self::bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Embedder whose service is always down
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::embedding("embedding service offline"))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// One scripted completion
pub enum Step {
    /// Plain-text answer
    Text(String),
    /// Ask for a tool call
    Tool(ToolCall),
    /// Answer with the output of the most recent tool call
    Summarize,
    /// The completion service fails
    Fail,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Step::Text(text.to_string())
    }

    pub fn tool(name: &str, arguments: Value) -> Self {
        Step::Tool(ToolCall::new(name, arguments))
    }
}

/// Completion service that plays back a script and records every request
pub struct ScriptedLlm {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let last_output = request.scratchpad.last().map(|entry| entry.output.clone());
        self.requests.lock().unwrap().push(request);

        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Text(text)) => Ok(Completion::text(text)),
            Some(Step::Tool(call)) => Ok(Completion::tool(call)),
            Some(Step::Summarize) => Ok(Completion::text(format!(
                "Here is what I found: {}",
                last_output.unwrap_or_default()
            ))),
            Some(Step::Fail) => Err(Error::completion("model crashed")),
            None => Err(Error::completion("script exhausted")),
        }
    }
}

/// Delegate that always fails
pub struct FailingDelegate;

#[async_trait]
impl Delegate for FailingDelegate {
    fn name(&self) -> &str {
        "failing"
    }

    async fn run(&self, _query: &str) -> Result<String> {
        Err(Error::delegate("sub-agent crashed"))
    }
}

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::with_data_dir(dir);
    config.index_backend = IndexBackend::Flat;
    config.embedding_dimensions = DIMENSIONS;
    config.chunk_size = 200;
    config.chunk_overlap = 40;
    config
}

/// A manager on a flat index and SQLite catalog under `dir`
pub fn manager_with(dir: &Path, embedder: Arc<dyn Embedder>) -> MemoryManager {
    let config = test_config(dir);
    config.ensure_dirs().expect("data dir");

    let sessions = SessionStore::open(config.session_table_path());
    let index = Arc::new(FlatIndex::open(config.flat_index_path()).expect("flat index"));
    let catalog = RecordCatalog::open(config.sqlite_path()).expect("catalog");
    let long_term = LongTermMemory::new(embedder, index, catalog);

    MemoryManager::new(config, sessions, Some(long_term)).expect("manager")
}

pub fn manager(dir: &Path) -> MemoryManager {
    manager_with(dir, Arc::new(BagOfWords))
}
