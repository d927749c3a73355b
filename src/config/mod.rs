// Configuration management module
// Handles TOML configuration, validation and the interactive setup flow

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GenerationConfig, JudgeConfig, OllamaConfig, PathsConfig,
    RetrievalConfig,
};
