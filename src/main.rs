use clap::{Parser, Subcommand};
use rag_eval::Result;
use rag_eval::commands::{ask, build_index, dashboard, evaluate, show_status};
use rag_eval::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(about = "Index PDFs, answer questions over them and evaluate the answers with an LLM judge")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml; relative data paths resolve against it
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and models
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build (or rebuild) the vector index from the source PDFs
    Index {
        /// Directory of PDFs to index instead of the configured one
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Answer a single question using the indexed documents
    Ask {
        question: String,
    },
    /// Run the test set through the pipeline and score it with the judge
    Evaluate {
        /// Test set JSON file to use instead of the configured one
        #[arg(long)]
        test_set: Option<PathBuf>,
        /// Where to write the scored table
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Browse the scored table
    Dashboard {
        /// Scored table to open instead of the configured one
        #[arg(long)]
        scores: Option<PathBuf>,
    },
    /// Show configuration, Ollama and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Index { source } => {
            build_index(&Config::load(&base_dir)?, source).await?;
        }
        Commands::Ask { question } => {
            ask(&Config::load(&base_dir)?, &question).await?;
        }
        Commands::Evaluate { test_set, output } => {
            evaluate(&Config::load(&base_dir)?, test_set, output).await?;
        }
        Commands::Dashboard { scores } => {
            dashboard(&Config::load(&base_dir)?, scores)?;
        }
        Commands::Status => {
            show_status(&Config::load(&base_dir)?).await?;
        }
    }

    Ok(())
}
