use super::*;
use std::sync::Mutex;

struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl LanguageModel for RecordingModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

struct FailingModel;

impl LanguageModel for FailingModel {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow::anyhow!("connection refused"))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

#[test]
fn prompt_contains_contexts_in_order_then_question() {
    let contexts = vec![
        "The tenant pays rent monthly.".to_string(),
        "Either party may terminate with 30 days notice.".to_string(),
    ];
    let prompt = build_prompt("What is the termination clause?", &contexts);

    assert!(prompt.starts_with("Use the following pieces of context"));
    assert!(prompt.contains(
        "Context: The tenant pays rent monthly.\n\nEither party may terminate with 30 days notice.\n\nQuestion:"
    ));
    assert!(prompt.contains("Question: What is the termination clause?"));
    assert!(prompt.ends_with("Helpful Answer:"));
    assert!(prompt.contains("just say that you don't know"));
}

#[test]
fn prompt_with_no_contexts_is_still_well_formed() {
    let prompt = build_prompt("Who is the landlord?", &[]);
    assert!(prompt.contains("Context: \n\nQuestion: Who is the landlord?"));
}

#[test]
fn placeholders_in_contexts_are_not_expanded() {
    let prompt = build_prompt("real question", &["{question}".to_string()]);
    assert!(prompt.contains("Context: {question}"));
    assert!(prompt.contains("Question: real question"));
}

#[test]
fn generate_returns_model_output_verbatim() {
    let model = Arc::new(RecordingModel::new("  I don't know.\n"));
    let generator = AnswerGenerator::new(Arc::clone(&model) as Arc<dyn LanguageModel>);

    let answer = generator
        .generate("What is the governing law?", &["Irrelevant text".to_string()])
        .expect("generation should succeed");

    assert_eq!(answer, "  I don't know.\n");
    assert_eq!(generator.model_name(), "recording");

    let prompts = model.prompts.lock().expect("lock should not be poisoned");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Irrelevant text"));
}

#[test]
fn generation_failures_propagate() {
    let generator = AnswerGenerator::new(Arc::new(FailingModel));
    let error = generator
        .generate("question", &[])
        .expect_err("failure should propagate");

    assert!(format!("{:#}", error).contains("connection refused"));
}
