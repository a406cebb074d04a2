//! Calculator sub-agent: arithmetic through the safe expression evaluator

use std::sync::Arc;

use async_trait::async_trait;

use super::executor::{ToolHandler, ToolLoop};
use super::Delegate;
use crate::calculator::calculate;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{CompletionService, ToolCall, ToolSpec};

const SYSTEM_PROMPT: &str = "You are a calculator assistant. \
For every arithmetic question, translate it into an expression using numbers, \
+ - * / and parentheses, and evaluate it with the calculator tool. \
Never compute results yourself. Reply with the result in one short sentence.";

struct CalculatorTool;

#[async_trait]
impl ToolHandler for CalculatorTool {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec::with_string_arg(
            "calculator",
            "Evaluate an arithmetic expression such as (2 + 3) * 4 / 5",
            "expression",
            "The arithmetic expression to evaluate",
        )]
    }

    async fn call(&self, call: &ToolCall) -> Result<String> {
        if call.name != "calculator" {
            return Err(Error::invalid_input(format!("unknown tool '{}'", call.name)));
        }
        let expression = call
            .str_arg("expression")
            .ok_or_else(|| Error::invalid_input("calculator needs an expression"))?;
        calculate(&expression)
    }
}

/// Answers arithmetic questions through the expression evaluator
pub struct CalculatorAgent {
    tool_loop: ToolLoop,
}

impl CalculatorAgent {
    pub fn new(completion: Arc<dyn CompletionService>, config: &Config) -> Self {
        Self {
            tool_loop: ToolLoop::new(completion, SYSTEM_PROMPT, config.max_tool_rounds),
        }
    }
}

#[async_trait]
impl Delegate for CalculatorAgent {
    fn name(&self) -> &str {
        "calculator"
    }

    async fn run(&self, query: &str) -> Result<String> {
        self.tool_loop.run(&CalculatorTool, query).await
    }
}
