//! The router and the sub-agents it delegates to

mod calculator;
mod document_qa;
mod executor;
mod router;

use async_trait::async_trait;

use crate::error::Result;

pub use calculator::CalculatorAgent;
pub use document_qa::DocumentQaAgent;
pub use executor::{ToolHandler, ToolLoop};
pub use router::{RouterState, Supervisor};

/// A specialised handler the router can hand one utterance to
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Answer one query
    async fn run(&self, query: &str) -> Result<String>;
}
