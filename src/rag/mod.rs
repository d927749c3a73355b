// Retrieval-augmented answering
// One retrieval feeds both the generator and the contexts handed back to the caller


pub mod generator;
pub mod retriever;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use generator::{AnswerGenerator, LanguageModel, build_prompt};
pub use retriever::{Retriever, VectorRetriever};

/// Number of contexts retrieved per question unless configured otherwise
pub const DEFAULT_TOP_K: usize = 3;

/// The answer to a question together with exactly the contexts it was generated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagResponse {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
}

/// Retriever and generator wired together with a fixed `top_k`
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Arc<dyn Retriever>,
    generator: AnswerGenerator,
    top_k: usize,
}

impl RagPipeline {
    #[inline]
    pub fn new(retriever: Arc<dyn Retriever>, generator: AnswerGenerator, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k: top_k.max(1),
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve once, then generate from those same contexts
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<RagResponse> {
        debug!("Answering question: {}", question);

        let contexts = self
            .retriever
            .retrieve(question, self.top_k)
            .await
            .context("Failed to retrieve contexts")?;

        let answer = self.generator.generate(question, &contexts)?;

        info!(
            "Answered question with {} contexts ({} chars)",
            contexts.len(),
            answer.len()
        );

        Ok(RagResponse {
            question: question.to_string(),
            answer,
            contexts,
        })
    }
}
