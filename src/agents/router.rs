//! Supervisor: routes each utterance to exactly one tool or sub-agent

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CalculatorAgent, Delegate, DocumentQaAgent};
use crate::error::{Error, Result};
use crate::llm::{Completion, CompletionRequest, CompletionService, ToolCall, ToolSpec};
use crate::manager::MemoryManager;
use crate::retrieval::render_transcript;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer general knowledge questions, \
greetings and small talk directly from your own knowledge without using any tool.

Use a tool only when it is clearly needed:
- call_calculator_agent for calculations that are hard to do mentally, e.g. \"calculate 2847 * 392 + 1583\"
- call_rag_agent to add a document to the knowledge base or to answer questions about the user's documents
- save_to_memory when the user asks you to remember something, e.g. \"remember that I like pizza\"
- retrieve_from_memory when the user asks what you remember about them
- show_conversation_history when the user asks about earlier questions in this conversation

Speak in the first person and keep answers concise.";

/// Where the router is in handling an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterState {
    Idle,
    Deciding,
    Delegating,
    Responding,
}

/// Routes each utterance to a direct answer or exactly one delegate, then
/// commits the exchange.
pub struct Supervisor {
    completion: Arc<dyn CompletionService>,
    manager: Arc<MemoryManager>,
    calculator: Arc<dyn Delegate>,
    document_qa: Arc<dyn Delegate>,
    state: Mutex<RouterState>,
}

impl Supervisor {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        manager: Arc<MemoryManager>,
        calculator: Arc<dyn Delegate>,
        document_qa: Arc<dyn Delegate>,
    ) -> Self {
        Self {
            completion,
            manager,
            calculator,
            document_qa,
            state: Mutex::new(RouterState::Idle),
        }
    }

    /// Wire up the calculator and document-QA agents on the same completion service
    pub fn with_default_agents(
        completion: Arc<dyn CompletionService>,
        manager: Arc<MemoryManager>,
    ) -> Self {
        let calculator = Arc::new(CalculatorAgent::new(completion.clone(), manager.config()));
        let document_qa = Arc::new(DocumentQaAgent::new(completion.clone(), manager.clone()));
        Self::new(completion, manager, calculator, document_qa)
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    pub fn state(&self) -> RouterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: RouterState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "router state");
        *state = next;
    }

    /// The tools offered to the completion service
    pub fn tools() -> Vec<ToolSpec> {
        vec![
            ToolSpec::with_string_arg(
                "call_calculator_agent",
                "Call the calculator agent with a query",
                "query",
                "The calculation to perform",
            ),
            ToolSpec::with_string_arg(
                "call_rag_agent",
                "Call the document agent with a query about the user's documents",
                "query",
                "The document request or question",
            ),
            ToolSpec::with_string_arg(
                "save_to_memory",
                "Save information to long term memory",
                "query",
                "The information to remember",
            ),
            ToolSpec::with_string_arg(
                "retrieve_from_memory",
                "Retrieve information from long term memory",
                "query",
                "What to look up",
            ),
            ToolSpec::new(
                "show_conversation_history",
                "Show the conversation history of this session",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
        ]
    }

    /// Handle one utterance. Always returns text and always commits the turn.
    pub async fn handle(&self, utterance: &str) -> String {
        self.transition(RouterState::Deciding);

        let request = CompletionRequest::new(SYSTEM_PROMPT, utterance)
            .with_history(self.manager.chat_history())
            .with_tools(Self::tools());

        let response = match self.completion.complete(request).await {
            Ok(Completion {
                tool_call: Some(call),
                ..
            }) => {
                self.transition(RouterState::Delegating);
                match self.delegate(&call, utterance).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "delegate failed");
                        apology()
                    }
                }
            }
            Ok(Completion { text, .. }) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("completion service returned an empty answer");
                apology()
            }
            Err(e) => {
                warn!(error = %e, "routing completion failed");
                apology()
            }
        };

        self.transition(RouterState::Responding);
        self.manager.record_turn(utterance, &response);
        self.transition(RouterState::Idle);
        response
    }

    async fn delegate(&self, call: &ToolCall, utterance: &str) -> Result<String> {
        let query = call.str_arg("query").unwrap_or_else(|| utterance.to_string());
        info!(tool = %call.name, "delegating");

        match call.name.as_str() {
            "call_calculator_agent" => run_delegate(self.calculator.as_ref(), &query).await,
            "call_rag_agent" => run_delegate(self.document_qa.as_ref(), &query).await,
            "save_to_memory" => Ok(self.manager.save_fact(&query).await),
            "retrieve_from_memory" => Ok(self.manager.query_facts(&query).await.to_string()),
            "show_conversation_history" => {
                let transcript = self.manager.current_transcript();
                Ok(if transcript.is_empty() {
                    "No conversation history found.".to_string()
                } else {
                    format!("Conversation history:\n{}", render_transcript(&transcript))
                })
            }
            other => Err(Error::delegate(format!("unknown tool '{}'", other))),
        }
    }
}

async fn run_delegate(delegate: &dyn Delegate, query: &str) -> Result<String> {
    delegate.run(query).await.map_err(|e| match e {
        Error::Delegate(_) => e,
        other => Error::delegate(format!("{} agent failed: {}", delegate.name(), other)),
    })
}

fn apology() -> String {
    "Sorry, I ran into a problem handling that request. Please try again.".to_string()
}
