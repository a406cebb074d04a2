//! Document QA sub-agent: knowledge-base ingestion and search tools

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::executor::{ToolHandler, ToolLoop};
use super::Delegate;
use crate::error::{Error, Result};
use crate::llm::{CompletionService, ToolCall, ToolSpec};
use crate::manager::MemoryManager;
use crate::retrieval::format_document_hits;

const MAX_RESULTS: usize = 20;

const SYSTEM_PROMPT: &str = "You are a document assistant with access to the user's knowledge base. \
Use add_document_to_knowledge when the user asks to add a file. \
Use search_knowledge_base to find passages before answering questions about documents, \
and answer only from what the search returns. If nothing relevant is found, say so.";

struct KnowledgeTools {
    manager: Arc<MemoryManager>,
}

impl KnowledgeTools {
    async fn add_document(&self, call: &ToolCall) -> Result<String> {
        let path = call
            .str_arg("file_path")
            .ok_or_else(|| Error::invalid_input("add_document_to_knowledge needs a file_path"))?;

        let report = self.manager.ingest_document(path.trim()).await?;
        Ok(if report.skipped {
            format!("{} is already in the knowledge base.", report.source)
        } else {
            format!(
                "Added {} to the knowledge base ({} chunks).",
                report.source, report.chunks
            )
        })
    }

    async fn search(&self, call: &ToolCall) -> Result<String> {
        let query = call
            .str_arg("query")
            .ok_or_else(|| Error::invalid_input("search_knowledge_base needs a query"))?;
        let k = call
            .usize_arg("num_results")
            .unwrap_or(self.manager.config().document_results)
            .clamp(1, MAX_RESULTS);

        let hits = self.manager.search_documents(&query, k).await?;
        Ok(format_document_hits(&hits))
    }
}

#[async_trait]
impl ToolHandler for KnowledgeTools {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::with_string_arg(
                "add_document_to_knowledge",
                "Add a text or PDF file to the knowledge base",
                "file_path",
                "Path of the file to add",
            ),
            ToolSpec::new(
                "search_knowledge_base",
                "Search the knowledge base for passages relevant to a query",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What to search for" },
                        "num_results": { "type": "integer", "description": "How many passages to return" }
                    },
                    "required": ["query"]
                }),
            ),
        ]
    }

    async fn call(&self, call: &ToolCall) -> Result<String> {
        match call.name.as_str() {
            "add_document_to_knowledge" => self.add_document(call).await,
            "search_knowledge_base" => self.search(call).await,
            other => Err(Error::invalid_input(format!("unknown tool '{}'", other))),
        }
    }
}

/// Answers questions about ingested documents
pub struct DocumentQaAgent {
    tool_loop: ToolLoop,
    tools: KnowledgeTools,
}

impl DocumentQaAgent {
    pub fn new(completion: Arc<dyn CompletionService>, manager: Arc<MemoryManager>) -> Self {
        let max_rounds = manager.config().max_tool_rounds;
        Self {
            tool_loop: ToolLoop::new(completion, SYSTEM_PROMPT, max_rounds),
            tools: KnowledgeTools { manager },
        }
    }
}

#[async_trait]
impl Delegate for DocumentQaAgent {
    fn name(&self) -> &str {
        "document_qa"
    }

    async fn run(&self, query: &str) -> Result<String> {
        self.tool_loop.run(&self.tools, query).await
    }
}
