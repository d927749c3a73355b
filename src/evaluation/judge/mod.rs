#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{EvaluationSample, Metric, MetricScores};
use crate::RagError;
use crate::rag::LanguageModel;

/// Scores a batch of samples on the four metrics, one result per sample in order
pub trait JudgeScorer: Send + Sync {
    fn score_batch(&self, samples: &[EvaluationSample]) -> Result<Vec<MetricScores>>;
}

/// Judge backed by a language model that answers in JSON
pub struct LlmJudge {
    model: Arc<dyn LanguageModel>,
}

#[derive(Debug, Deserialize)]
struct ClaimsVerdict {
    #[serde(default)]
    claims: Vec<ClaimVerdict>,
}

#[derive(Debug, Deserialize)]
struct ClaimVerdict {
    #[serde(default)]
    claim: String,
    supported: bool,
}

#[derive(Debug, Deserialize)]
struct RelevanceVerdict {
    relevance_score: f64,
}

#[derive(Debug, Deserialize)]
struct StatementsVerdict {
    #[serde(default)]
    statements: Vec<StatementVerdict>,
}

#[derive(Debug, Deserialize)]
struct StatementVerdict {
    #[serde(default)]
    statement: String,
    attributed: bool,
}

#[derive(Debug, Deserialize)]
struct ContextVerdicts {
    #[serde(default)]
    verdicts: Vec<ContextVerdict>,
}

#[derive(Debug, Deserialize)]
struct ContextVerdict {
    chunk_index: usize,
    relevant: bool,
}

impl LlmJudge {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Score one sample; each metric is a separate judge call
    #[inline]
    pub fn score(&self, sample: &EvaluationSample) -> Result<MetricScores> {
        Ok(MetricScores {
            faithfulness: self.faithfulness(sample)?,
            answer_relevancy: self.answer_relevancy(sample)?,
            context_recall: self.context_recall(sample)?,
            context_precision: self.context_precision(sample)?,
        })
    }

    fn ask<T: DeserializeOwned>(&self, metric: Metric, prompt: &str) -> Result<T> {
        let output = self
            .model
            .complete(prompt)
            .with_context(|| format!("Judge call for {} failed", metric))?;

        parse_judge_output(&output).map_err(|e| {
            RagError::Judge(format!("Unparseable {} verdict: {}", metric, e)).into()
        })
    }

    fn faithfulness(&self, sample: &EvaluationSample) -> Result<f64> {
        let verdict: ClaimsVerdict =
            self.ask(Metric::Faithfulness, &faithfulness_prompt(sample))?;

        let supported = verdict.claims.iter().filter(|c| c.supported).count();
        for claim in verdict.claims.iter().filter(|c| !c.supported) {
            debug!("Unsupported claim: {}", claim.claim);
        }

        Ok(ratio(supported, verdict.claims.len(), 1.0))
    }

    fn answer_relevancy(&self, sample: &EvaluationSample) -> Result<f64> {
        let verdict: RelevanceVerdict =
            self.ask(Metric::AnswerRelevancy, &answer_relevancy_prompt(sample))?;

        clamp_score(Metric::AnswerRelevancy, verdict.relevance_score)
    }

    fn context_recall(&self, sample: &EvaluationSample) -> Result<f64> {
        if sample.contexts.is_empty() {
            return Ok(0.0);
        }

        let verdict: StatementsVerdict =
            self.ask(Metric::ContextRecall, &context_recall_prompt(sample))?;

        let attributed = verdict.statements.iter().filter(|s| s.attributed).count();
        for statement in verdict.statements.iter().filter(|s| !s.attributed) {
            debug!("Statement not found in contexts: {}", statement.statement);
        }

        Ok(ratio(attributed, verdict.statements.len(), 0.0))
    }

    fn context_precision(&self, sample: &EvaluationSample) -> Result<f64> {
        if sample.contexts.is_empty() {
            return Ok(0.0);
        }

        let verdict: ContextVerdicts =
            self.ask(Metric::ContextPrecision, &context_precision_prompt(sample))?;

        // Contexts the judge skipped count as not relevant
        let mut relevance = vec![false; sample.contexts.len()];
        for v in verdict.verdicts {
            match relevance.get_mut(v.chunk_index) {
                Some(slot) => *slot = v.relevant,
                None => warn!(
                    "Judge returned a verdict for chunk {} but only {} contexts exist",
                    v.chunk_index,
                    sample.contexts.len()
                ),
            }
        }

        Ok(average_precision(&relevance))
    }
}

impl JudgeScorer for LlmJudge {
    #[inline]
    fn score_batch(&self, samples: &[EvaluationSample]) -> Result<Vec<MetricScores>> {
        samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let scores = self
                    .score(sample)
                    .with_context(|| format!("Failed to score question: {}", sample.question))?;
                info!(
                    "Scored {}/{}: faithfulness={:.3} answer_relevancy={:.3} context_recall={:.3} context_precision={:.3}",
                    i + 1,
                    samples.len(),
                    scores.faithfulness,
                    scores.answer_relevancy,
                    scores.context_recall,
                    scores.context_precision
                );
                Ok(scores)
            })
            .collect()
    }
}

/// Extract the JSON object from a judge reply, tolerating surrounding prose or code fences
pub(crate) fn parse_judge_output<T: DeserializeOwned>(output: &str) -> Result<T> {
    let start = output
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("no JSON object in judge output: {}", output.trim()))?;
    let object = output
        .rfind('}')
        .filter(|end| *end > start)
        .and_then(|end| output.get(start..=end))
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON object in judge output"))?;

    serde_json::from_str(object).context("judge output did not match the expected shape")
}

/// `part / total`, or `empty` when there is nothing to count
pub(crate) fn ratio(part: usize, total: usize, empty: f64) -> f64 {
    if total == 0 {
        empty
    } else {
        part as f64 / total as f64
    }
}

/// Mean of precision@k over the ranks k that hold a relevant context
pub(crate) fn average_precision(relevance: &[bool]) -> f64 {
    let mut hits = 0usize;
    let mut sum = 0.0;

    for (rank, relevant) in relevance.iter().enumerate() {
        if *relevant {
            hits += 1;
            sum += hits as f64 / (rank + 1) as f64;
        }
    }

    if hits == 0 { 0.0 } else { sum / hits as f64 }
}

/// Reject non-finite judge numbers and pull anything else into [0, 1]
pub(crate) fn clamp_score(metric: Metric, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(RagError::Judge(format!("{} score is not a number: {}", metric, value)).into());
    }

    if !(0.0..=1.0).contains(&value) {
        warn!("{} score {} is outside [0, 1], clamping", metric, value);
        return Ok(value.clamp(0.0, 1.0));
    }

    Ok(value)
}

fn numbered_contexts(contexts: &[String]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[Chunk {}]: {}", i, c))
        .join("\n\n")
}

fn faithfulness_prompt(sample: &EvaluationSample) -> String {
    format!(
        r#"Evaluate whether the answer is faithful to the context.

CONTEXT:
{context}

QUESTION:
{question}

ANSWER:
{answer}

Break the answer into atomic factual claims. For each claim decide whether it can be
directly inferred from the context. If the answer makes no factual claims (for example
it only says it does not know), return an empty list.

Respond in JSON:
{{
  "claims": [
    {{"claim": "...", "supported": true}},
    {{"claim": "...", "supported": false}}
  ]
}}"#,
        context = sample.contexts.join("\n\n"),
        question = sample.question,
        answer = sample.answer,
    )
}

fn answer_relevancy_prompt(sample: &EvaluationSample) -> String {
    format!(
        r#"Evaluate how relevant the answer is to the question.

QUESTION:
{question}

ANSWER:
{answer}

Consider whether the answer directly addresses the question, whether it is complete
and whether it contains unnecessary information. An evasive or noncommittal answer
is not relevant.

Respond in JSON:
{{
  "relevance_score": <float 0-1>,
  "reasoning": "<explanation>"
}}"#,
        question = sample.question,
        answer = sample.answer,
    )
}

fn context_recall_prompt(sample: &EvaluationSample) -> String {
    format!(
        r#"Evaluate whether the retrieved context contains the information in the reference answer.

QUESTION:
{question}

RETRIEVED CONTEXT:
{context}

REFERENCE ANSWER:
{ground_truth}

Break the reference answer into individual statements. For each statement decide
whether it can be attributed to the retrieved context.

Respond in JSON:
{{
  "statements": [
    {{"statement": "...", "attributed": true}},
    {{"statement": "...", "attributed": false}}
  ]
}}"#,
        question = sample.question,
        context = numbered_contexts(&sample.contexts),
        ground_truth = sample.ground_truth,
    )
}

fn context_precision_prompt(sample: &EvaluationSample) -> String {
    format!(
        r#"Evaluate the precision of the retrieved context for answering the question.

QUESTION:
{question}

RETRIEVED CONTEXT (in order):
{context}

REFERENCE ANSWER:
{ground_truth}

For each chunk of context, decide whether it was useful in arriving at the reference answer.

Respond in JSON:
{{
  "verdicts": [
    {{"chunk_index": 0, "relevant": true}},
    {{"chunk_index": 1, "relevant": false}}
  ]
}}"#,
        question = sample.question,
        context = numbered_contexts(&sample.contexts),
        ground_truth = sample.ground_truth,
    )
}
