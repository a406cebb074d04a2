//! Completion service interface and the Ollama chat client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{ChatMessage, Role};

/// A tool the model may ask to call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// A tool taking a single required string argument
    pub fn with_string_arg(
        name: impl Into<String>,
        description: impl Into<String>,
        arg: &str,
        arg_description: &str,
    ) -> Self {
        Self::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {
                    arg: { "type": "string", "description": arg_description }
                },
                "required": [arg]
            }),
        )
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// A string argument. A bare string payload counts as the argument, and a
    /// single-field object answers for any key.
    pub fn str_arg(&self, key: &str) -> Option<String> {
        match &self.arguments {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => match map.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(_) => None,
                None if map.len() == 1 => map.values().next().and_then(Value::as_str).map(str::to_string),
                None => None,
            },
            _ => None,
        }
    }

    /// An unsigned integer argument, accepting numeric strings
    pub fn usize_arg(&self, key: &str) -> Option<usize> {
        match self.arguments.get(key)? {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A tool call already made during this request, with its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub call: ToolCall,
    pub output: String,
}

/// Everything the model sees for one completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub input: String,
    pub tools: Vec<ToolSpec>,
    /// Prior tool outputs, appended after the user input
    pub scratchpad: Vec<ScratchpadEntry>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// The model's reply: text, optionally with a tool call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_call: Option<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_call: None,
        }
    }

    pub fn tool(call: ToolCall) -> Self {
        Self {
            text: String::new(),
            tool_call: Some(call),
        }
    }
}

/// Prompt in, text (and maybe a tool call) out
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Chat completions from a local Ollama server
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.completion_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn role_name(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let message = |m: &ChatMessage| json!({ "role": Self::role_name(m.role), "content": m.content });

        let mut messages = vec![message(&ChatMessage::system(request.system_prompt.as_str()))];
        messages.extend(request.history.iter().map(message));
        messages.push(message(&ChatMessage::user(request.input.as_str())));

        for entry in &request.scratchpad {
            messages.push(json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "function": { "name": entry.call.name, "arguments": entry.call.arguments }
                }]
            }));
            messages.push(json!({ "role": "tool", "content": entry.output }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let start = Instant::now();
        let body = self.request_body(&request);

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::completion(format!("Ollama not reachable: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::completion(format!(
                "Ollama returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let api_resp: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::completion(format!("Malformed chat response: {}", e)))?;

        let tool_call = api_resp
            .message
            .tool_calls
            .into_iter()
            .next()
            .map(|call| {
                // Some models send the arguments object as an encoded string
                let arguments = match call.function.arguments {
                    Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                    other => other,
                };
                ToolCall::new(call.function.name, arguments)
            });

        debug!(
            model = %api_resp.model,
            latency_ms = start.elapsed().as_millis() as u64,
            eval_tokens = api_resp.eval_count.unwrap_or(0),
            tool = tool_call.as_ref().map(|c| c.name.as_str()).unwrap_or("-"),
            "completion finished"
        );

        Ok(Completion {
            text: api_resp.message.content,
            tool_call,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_args_are_lenient() {
        let call = ToolCall::new("t", json!({ "query": "12*7" }));
        assert_eq!(call.str_arg("query").as_deref(), Some("12*7"));

        let renamed = ToolCall::new("t", json!({ "input": "hi" }));
        assert_eq!(renamed.str_arg("query").as_deref(), Some("hi"));

        let bare = ToolCall::new("t", json!("plain"));
        assert_eq!(bare.str_arg("query").as_deref(), Some("plain"));

        let ambiguous = ToolCall::new("t", json!({ "a": "1", "b": "2" }));
        assert_eq!(ambiguous.str_arg("query"), None);
    }

    #[test]
    fn usize_args_accept_strings() {
        let call = ToolCall::new("t", json!({ "n": "4", "m": 2 }));
        assert_eq!(call.usize_arg("n"), Some(4));
        assert_eq!(call.usize_arg("m"), Some(2));
        assert_eq!(call.usize_arg("missing"), None);
    }

    #[test]
    fn body_places_scratchpad_after_input() {
        let client = OllamaClient::new(&Config::default());
        let mut request = CompletionRequest::new("sys", "what is 2+2?")
            .with_history(vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")])
            .with_tools(vec![ToolSpec::with_string_arg(
                "calculator",
                "Evaluate arithmetic",
                "expression",
                "Expression",
            )]);
        request.scratchpad.push(ScratchpadEntry {
            call: ToolCall::new("calculator", json!({ "expression": "2+2" })),
            output: "4".to_string(),
        });

        let body = client.request_body(&request);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant", "tool"]);
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert_eq!(body["stream"], false);
    }
}
