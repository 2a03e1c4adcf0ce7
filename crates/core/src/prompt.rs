use crate::models::RetrievedChunk;
use serde::{Deserialize, Serialize};

pub const GROUNDING_INSTRUCTION: &str = "You are a helpful assistant. Answer the following question using ONLY the context provided. If the answer is not in the context, say you don't know.";

/// Prompt split into the system instruction and the user turn carrying context and question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
}

impl GroundedPrompt {
    /// Single-string form for completion APIs without message roles.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Retrieved passages in rank order, separated by blank lines.
pub fn compose_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, hits: &[RetrievedChunk]) -> GroundedPrompt {
    let context = compose_context(hits);
    GroundedPrompt {
        system: GROUNDING_INSTRUCTION.to_string(),
        user: format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"),
    }
}
