#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

/// A generative model that turns a prompt into text
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`, returning the model's raw output
    fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Fill the answer template. Contexts are separated by a blank line, in the order given.
#[inline]
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end.\n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         Provide a concise and factual answer.\n\
         \n\
         Context: {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Helpful Answer:",
        context = contexts.join("\n\n"),
    )
}

/// Answers a question from a fixed set of contexts
#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
}

impl AnswerGenerator {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    #[inline]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Prompt the model with `contexts` and return its output verbatim.
    ///
    /// "I don't know" is a valid answer; the output is not inspected.
    #[inline]
    pub fn generate(&self, question: &str, contexts: &[String]) -> Result<String> {
        let prompt = build_prompt(question, contexts);
        debug!(
            "Generating answer with {} from {} contexts",
            self.model.model_name(),
            contexts.len()
        );

        self.model
            .complete(&prompt)
            .with_context(|| format!("Answer generation failed for question: {}", question))
    }
}
