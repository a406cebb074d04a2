//! Tool-calling loop shared by the sub-agents

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, CompletionService, ScratchpadEntry, ToolCall, ToolSpec};

/// The tools a sub-agent exposes to the model
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn call(&self, call: &ToolCall) -> Result<String>;
}

/// Completion, tool call, scratchpad, completion again, until the model
/// answers in plain text.
pub struct ToolLoop {
    completion: Arc<dyn CompletionService>,
    system_prompt: String,
    max_rounds: usize,
}

impl ToolLoop {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        system_prompt: impl Into<String>,
        max_rounds: usize,
    ) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
            max_rounds,
        }
    }

    /// Run the loop for one input. Tool failures go back to the model as
    /// `Error: ...` text; running out of rounds is a delegate failure.
    pub async fn run(&self, tools: &dyn ToolHandler, input: &str) -> Result<String> {
        let mut request =
            CompletionRequest::new(self.system_prompt.clone(), input).with_tools(tools.specs());

        loop {
            let completion = self.completion.complete(request.clone()).await?;

            let Some(call) = completion.tool_call else {
                if !completion.text.trim().is_empty() {
                    return Ok(completion.text);
                }
                // an empty answer after a tool call means the tool output is the answer
                return request
                    .scratchpad
                    .last()
                    .map(|entry| entry.output.clone())
                    .ok_or_else(|| Error::delegate("the model returned an empty answer"));
            };

            if request.scratchpad.len() >= self.max_rounds {
                return Err(Error::delegate(format!(
                    "no answer after {} tool calls",
                    self.max_rounds
                )));
            }

            let output = match tools.call(&call).await {
                Ok(output) => output,
                Err(e) => format!("Error: {}", e),
            };
            debug!(tool = %call.name, round = request.scratchpad.len() + 1, "tool call finished");
            request.scratchpad.push(ScratchpadEntry { call, output });
        }
    }
}
