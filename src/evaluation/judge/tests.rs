use super::*;
use std::sync::Mutex;

/// Replies by looking at which metric the prompt asks about
struct ScriptedJudge {
    faithfulness: String,
    relevancy: String,
    recall: String,
    precision: String,
    calls: Mutex<usize>,
}

impl ScriptedJudge {
    fn new(faithfulness: &str, relevancy: &str, recall: &str, precision: &str) -> Self {
        Self {
            faithfulness: faithfulness.to_string(),
            relevancy: relevancy.to_string(),
            recall: recall.to_string(),
            precision: precision.to_string(),
            calls: Mutex::new(0),
        }
    }
}

impl LanguageModel for ScriptedJudge {
    fn complete(&self, prompt: &str) -> Result<String> {
        *self.calls.lock().expect("lock should not be poisoned") += 1;

        let reply = if prompt.starts_with("Evaluate whether the answer is faithful") {
            &self.faithfulness
        } else if prompt.starts_with("Evaluate how relevant") {
            &self.relevancy
        } else if prompt.starts_with("Evaluate whether the retrieved context contains") {
            &self.recall
        } else {
            &self.precision
        };
        Ok(reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted-judge"
    }
}

fn sample() -> EvaluationSample {
    EvaluationSample {
        question: "What is the termination clause?".to_string(),
        answer: "Either party may terminate with 30 days notice.".to_string(),
        contexts: vec![
            "Rent is due monthly.".to_string(),
            "Either party may terminate this agreement with 30 days notice.".to_string(),
            "Notices must be in writing.".to_string(),
        ],
        ground_truth: "30 days notice".to_string(),
    }
}

#[test]
fn average_precision_rewards_relevant_contexts_ranked_first() {
    assert!((average_precision(&[true, false, false]) - 1.0).abs() < 1e-9);
    assert!((average_precision(&[false, true, false]) - 0.5).abs() < 1e-9);
    assert!((average_precision(&[true, false, true]) - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    assert_eq!(average_precision(&[false, false]), 0.0);
    assert_eq!(average_precision(&[]), 0.0);
}

#[test]
fn ratio_uses_empty_value_when_nothing_to_count() {
    assert_eq!(ratio(0, 0, 1.0), 1.0);
    assert_eq!(ratio(0, 0, 0.0), 0.0);
    assert!((ratio(2, 3, 0.0) - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn clamp_score_bounds_and_rejects_nan() {
    assert_eq!(
        clamp_score(Metric::AnswerRelevancy, 0.42).expect("in range"),
        0.42
    );
    assert_eq!(clamp_score(Metric::AnswerRelevancy, 1.7).expect("clamped"), 1.0);
    assert_eq!(clamp_score(Metric::AnswerRelevancy, -0.2).expect("clamped"), 0.0);
    assert!(clamp_score(Metric::AnswerRelevancy, f64::NAN).is_err());
    assert!(clamp_score(Metric::AnswerRelevancy, f64::INFINITY).is_err());
}

#[test]
fn parse_judge_output_tolerates_fences_and_prose() {
    let output = "Sure! Here is my verdict:\n```json\n{\"relevance_score\": 0.8}\n```";
    let verdict: RelevanceVerdict = parse_judge_output(output).expect("should parse");
    assert!((verdict.relevance_score - 0.8).abs() < 1e-9);

    assert!(parse_judge_output::<RelevanceVerdict>("no json here").is_err());
    assert!(parse_judge_output::<RelevanceVerdict>("{\"other\": 1}").is_err());
    assert!(parse_judge_output::<RelevanceVerdict>("} {").is_err());
}

#[test]
fn scores_one_sample_from_verdicts() {
    let judge_model = Arc::new(ScriptedJudge::new(
        r#"{"claims": [{"claim": "30 days notice", "supported": true}, {"claim": "in writing", "supported": false}]}"#,
        r#"{"relevance_score": 0.9, "reasoning": "direct"}"#,
        r#"{"statements": [{"statement": "30 days notice", "attributed": true}]}"#,
        r#"{"verdicts": [{"chunk_index": 0, "relevant": false}, {"chunk_index": 1, "relevant": true}, {"chunk_index": 2, "relevant": false}]}"#,
    ));
    let judge = LlmJudge::new(Arc::clone(&judge_model) as Arc<dyn LanguageModel>);

    let scores = judge.score(&sample()).expect("scoring should succeed");

    assert!((scores.faithfulness - 0.5).abs() < 1e-9);
    assert!((scores.answer_relevancy - 0.9).abs() < 1e-9);
    assert!((scores.context_recall - 1.0).abs() < 1e-9);
    assert!((scores.context_precision - 0.5).abs() < 1e-9);
    assert_eq!(
        *judge_model.calls.lock().expect("lock should not be poisoned"),
        4
    );
}

#[test]
fn refusal_without_claims_is_faithful() {
    let judge = LlmJudge::new(Arc::new(ScriptedJudge::new(
        r#"{"claims": []}"#,
        r#"{"relevance_score": 0.1}"#,
        r#"{"statements": []}"#,
        r#"{"verdicts": []}"#,
    )));

    let mut refusal = sample();
    refusal.answer = "I don't know.".to_string();
    let scores = judge.score(&refusal).expect("scoring should succeed");

    assert_eq!(scores.faithfulness, 1.0);
    assert_eq!(scores.context_recall, 0.0);
    assert_eq!(scores.context_precision, 0.0);
}

#[test]
fn out_of_range_verdict_indices_are_ignored() {
    let judge = LlmJudge::new(Arc::new(ScriptedJudge::new(
        r#"{"claims": []}"#,
        r#"{"relevance_score": 2.5}"#,
        r#"{"statements": []}"#,
        r#"{"verdicts": [{"chunk_index": 7, "relevant": true}, {"chunk_index": 2, "relevant": true}]}"#,
    )));

    let scores = judge.score(&sample()).expect("scoring should succeed");
    assert_eq!(scores.answer_relevancy, 1.0);
    assert!((scores.context_precision - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn no_contexts_skips_context_metrics() {
    let judge_model = Arc::new(ScriptedJudge::new(
        r#"{"claims": []}"#,
        r#"{"relevance_score": 0.5}"#,
        "not used",
        "not used",
    ));
    let judge = LlmJudge::new(Arc::clone(&judge_model) as Arc<dyn LanguageModel>);

    let mut empty = sample();
    empty.contexts.clear();
    let scores = judge.score(&empty).expect("scoring should succeed");

    assert_eq!(scores.context_recall, 0.0);
    assert_eq!(scores.context_precision, 0.0);
    assert_eq!(
        *judge_model.calls.lock().expect("lock should not be poisoned"),
        2
    );
}

#[test]
fn malformed_verdict_is_a_judge_error() {
    let judge = LlmJudge::new(Arc::new(ScriptedJudge::new(
        "I cannot evaluate this.",
        r#"{"relevance_score": 0.5}"#,
        r#"{"statements": []}"#,
        r#"{"verdicts": []}"#,
    )));

    let error = judge
        .score_batch(&[sample()])
        .expect_err("bad verdict should fail");
    assert!(matches!(
        error.downcast_ref::<RagError>(),
        Some(RagError::Judge(_))
    ));
}

#[test]
fn score_batch_keeps_order_and_length() {
    let judge = LlmJudge::new(Arc::new(ScriptedJudge::new(
        r#"{"claims": [{"claim": "x", "supported": true}]}"#,
        r#"{"relevance_score": 0.75}"#,
        r#"{"statements": [{"statement": "x", "attributed": false}]}"#,
        r#"{"verdicts": [{"chunk_index": 0, "relevant": true}]}"#,
    )));

    let samples = vec![sample(), sample(), sample()];
    let scores = judge.score_batch(&samples).expect("scoring should succeed");

    assert_eq!(scores.len(), 3);
    for s in &scores {
        for metric in Metric::ALL {
            assert!((0.0..=1.0).contains(&s.get(metric)));
        }
    }
}
