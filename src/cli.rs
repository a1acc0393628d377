use crate::extract::ExtractPolicy;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Generate a Streamlit app from a prompt and package it as a zip
#[derive(Debug, Parser)]
#[command(name = "appgen")]
#[command(version)]
#[command(about = "Generate a Streamlit app from a prompt and package it as a zip", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Provider (default: config/provider or "google")
    #[arg(long = "provider", global = true)]
    pub provider: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct OutputArgs {
    /// How the answer is split into files (default: config/policy or whole-text)
    #[arg(long = "policy", value_enum, global = true)]
    pub policy: Option<ExtractPolicy>,

    /// Where to copy the packaged zip
    #[arg(short = 'o', long = "out", value_name = "PATH", default_value = "project.zip", global = true)]
    pub out: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive session: type prompts, then /files, /package, /preview
    Shell,

    /// Split a saved model answer into files and package them (no network)
    Extract {
        /// File holding the raw model answer
        input: PathBuf,
    },

    /// Show app.py from a saved model answer as text (never executed)
    Preview {
        /// File holding the raw model answer
        input: PathBuf,
    },
}
