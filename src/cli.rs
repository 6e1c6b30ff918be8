use anyhow::{Result, bail};
use clap::Parser;

/// Ask a question to an LLM via OpenRouter. Requires the OPENROUTER_API_KEY env var.
#[derive(Debug, Parser)]
#[command(name = "ask", version, about, long_about = None)]
pub struct Cli {
    /// The question to ask the LLM.
    #[arg(required = true, num_args = 1.., value_name = "QUESTION")]
    pub question: Vec<String>,
}

impl Cli {
    /// Joins the words back into a single question.
    pub fn question(&self) -> Result<String> {
        let question = self.question.join(" ");
        if question.trim().is_empty() {
            bail!("The question cannot be empty.");
        }
        Ok(question)
    }
}
