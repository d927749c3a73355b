use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::RagError;
use crate::config::Config;
use crate::dashboard::run_dashboard;
use crate::database::VectorStore;
use crate::embeddings::{Embedder, OllamaClient, OllamaLanguageModel};
use crate::evaluation::{
    EvaluationDriver, LlmJudge, Metric, ScoredTable, format_score, load_test_set,
};
use crate::indexer::{Indexer, IndexingStats};
use crate::rag::{AnswerGenerator, RagPipeline, RagResponse, VectorRetriever};

/// Rebuild the vector index from the PDFs in the source directory
#[inline]
pub async fn build_index(config: &Config, source: Option<PathBuf>) -> Result<IndexingStats> {
    let source_dir = source.unwrap_or_else(|| config.source_documents_path());
    let index_path = config.vector_store_path();

    println!("📚 Building index from {}", source_dir.display());

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let indexer = Indexer::new(Arc::new(client), config.chunking.clone())
        .with_batch_size(config.ollama.batch_size as usize)
        .with_empty_index_dimension(config.ollama.embedding_dimension as usize);

    let stats = indexer.build_index(&source_dir, &index_path).await?;

    if stats.documents_loaded == 0 {
        println!("⚠️  No PDF documents found in {}", source_dir.display());
        println!("   An empty index was created at {}", index_path.display());
        return Ok(stats);
    }

    println!("✅ Index built at {}", index_path.display());
    println!("   📄 Pages loaded: {}", stats.documents_loaded);
    println!("   🧩 Chunks created: {}", stats.chunks_created);
    println!("   🔢 Embeddings stored: {}", stats.embeddings_stored);
    println!("   📐 Vector dimension: {}", stats.vector_dimension);

    Ok(stats)
}

/// Assemble the retrieval + generation pipeline against the built index
#[inline]
pub async fn open_pipeline(config: &Config) -> Result<RagPipeline> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let embedder: Arc<dyn Embedder> = Arc::new(client.clone());

    let retriever = VectorRetriever::open(&config.vector_store_path(), embedder).await?;
    let model = OllamaLanguageModel::for_generation(client, &config.generation);

    Ok(RagPipeline::new(
        Arc::new(retriever),
        AnswerGenerator::new(Arc::new(model)),
        config.retrieval.top_k,
    ))
}

/// Answer a single question and print the answer with its contexts
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<RagResponse> {
    let pipeline = open_pipeline(config).await?;
    let response = pipeline.answer(question).await?;

    println!("❓ {}", response.question);
    println!();
    println!("💬 {}", response.answer.trim());
    println!();
    println!("📎 Contexts ({}):", response.contexts.len());
    for (i, context) in response.contexts.iter().enumerate() {
        println!("   [{}] {}", i + 1, context.trim());
    }

    Ok(response)
}

/// Run every test case through the pipeline, judge the results and persist the scored table
#[inline]
pub async fn evaluate(
    config: &Config,
    test_set: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ScoredTable> {
    let test_set_path = test_set.unwrap_or_else(|| config.test_set_path());
    let output_path = output.unwrap_or_else(|| config.scores_path());

    let cases = load_test_set(&test_set_path)?;
    println!(
        "🧪 Evaluating {} questions from {}",
        cases.len(),
        test_set_path.display()
    );

    let pipeline = open_pipeline(config).await?;
    let judge_client =
        OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let judge = LlmJudge::new(Arc::new(OllamaLanguageModel::for_judge(
        judge_client,
        &config.judge,
    )));

    let driver = EvaluationDriver::new(pipeline, Arc::new(judge));
    let table = match driver.run(&cases).await {
        Ok(table) => table,
        Err(e) => {
            error!("Evaluation aborted: {:#}", e);
            return Err(e);
        }
    };

    table.write_csv(&output_path)?;
    info!("Wrote {} scored rows to {}", table.len(), output_path.display());

    print_scored_table(&table);
    println!("💾 Scores saved to {}", output_path.display());

    Ok(table)
}

fn print_scored_table(table: &ScoredTable) {
    println!();
    println!("📋 Individual Results");
    println!("{}", "=".repeat(50));
    for (i, row) in table.rows().iter().enumerate() {
        println!("{}. {}", i + 1, row.question);
        for metric in Metric::ALL {
            println!(
                "   {:<18} {}",
                format!("{}:", metric.as_str()),
                format_score(row.scores.get(metric))
            );
        }
    }

    println!();
    println!("📊 Average Scores");
    println!("{}", "=".repeat(50));
    let averages = table.averages();
    for metric in Metric::ALL {
        println!(
            "   {:<18} {}",
            format!("{}:", metric.as_str()),
            format_score(averages.get(metric))
        );
    }
    println!();
}

/// Open the interactive results viewer
#[inline]
pub fn dashboard(config: &Config, scores: Option<PathBuf>) -> Result<()> {
    let scores_path = scores.unwrap_or_else(|| config.scores_path());
    run_dashboard(&scores_path)
}

#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 RAG Eval Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("⚙️  Configuration:");
    let config_file = config.config_file_path();
    if config_file.exists() {
        println!("   ✅ Loaded from {}", config_file.display());
    } else {
        println!("   💤 No config file, using defaults");
    }
    println!("   📋 Generation model: {}", config.generation.model);
    println!("   ⚖️  Judge model: {}", config.judge.model);

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {:#}", e);
        }
    }

    println!("🔍 Vector Index Status:");
    report_index(&config.vector_store_path()).await;

    println!("📈 Evaluation Results:");
    let scores_path = config.scores_path();
    if scores_path.exists() {
        match ScoredTable::read_csv(&scores_path) {
            Ok(table) => {
                println!(
                    "   ✅ {} scored rows in {}",
                    table.len(),
                    scores_path.display()
                );
            }
            Err(e) => {
                println!("   ⚠️  Unreadable scores file - {:#}", e);
            }
        }
    } else {
        println!("   💤 No scores yet ({})", scores_path.display());
    }

    println!();
    Ok(())
}

async fn report_index(index_path: &Path) {
    let store = match VectorStore::open(index_path).await {
        Ok(store) => store,
        Err(RagError::IndexNotBuilt(path)) => {
            println!("   💤 Not built yet ({})", path.display());
            return;
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
            return;
        }
    };

    match store.count_chunks().await {
        Ok(count) => {
            println!("   ✅ LanceDB: {} chunks at {}", count, index_path.display());
            println!("   📐 Vector dimension: {}", store.vector_dimension());
        }
        Err(e) => {
            println!("   ⚠️  LanceDB: Opened but could not count chunks - {}", e);
        }
    }
}
