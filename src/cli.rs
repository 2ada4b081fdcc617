use std::time::Duration;

use clap::{ArgAction, Parser};

use qualifire::config::ClientConfig;
use qualifire::types::EvaluateParams;

/// Command-line options for the Qualifire evaluation helper.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Run Qualifire checks on an input/output pair", long_about = None)]
pub struct CliArgs {
    /// Input text (the prompt) to evaluate.
    #[arg(long = "input")]
    pub input: Option<String>,

    /// Output text (the model response) to evaluate.
    #[arg(long = "output")]
    pub output: Option<String>,

    /// Custom assertion to check against the output (repeatable).
    #[arg(long = "assertion", value_name = "TEXT")]
    pub assertions: Vec<String>,

    /// Check whether the output is grounded in the provided input.
    #[arg(long = "grounding", action = ArgAction::SetTrue)]
    pub grounding_check: bool,

    /// Check for factual inaccuracies or hallucinations.
    #[arg(long = "hallucinations", action = ArgAction::SetTrue)]
    pub hallucinations_check: bool,

    /// Check whether the output follows instructions in the input.
    #[arg(long = "instructions-following", action = ArgAction::SetTrue)]
    pub instructions_following_check: bool,

    /// Check for personally identifiable information.
    #[arg(long = "pii", action = ArgAction::SetTrue)]
    pub pii_check: bool,

    /// Check for prompt injection attempts.
    #[arg(long = "prompt-injections", action = ArgAction::SetTrue)]
    pub prompt_injections: bool,

    /// Check for content moderation violations.
    #[arg(long = "content-moderation", action = ArgAction::SetTrue)]
    pub content_moderation_check: bool,

    /// Check tool selection quality. Requires conversation messages and
    /// tool definitions, which the CLI cannot supply, so this is rejected
    /// at validation with an explanation.
    #[arg(long = "tool-selection-quality", action = ArgAction::SetTrue)]
    pub tool_selection_quality_check: bool,

    /// Qualifire API key.
    #[arg(long = "api-key", env = "QUALIFIRE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the Qualifire gateway.
    #[arg(long = "base-url", env = "QUALIFIRE_BASE_URL")]
    pub base_url: Option<String>,

    /// Network timeout (seconds) applied to HTTP requests.
    #[arg(long = "timeout", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..=3600))]
    timeout_secs: u64,
}

impl CliArgs {
    /// Returns the configured network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Convert CLI arguments into a client configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            timeout: self.timeout(),
        }
    }

    /// Convert CLI arguments into evaluation parameters.
    pub fn evaluate_params(&self) -> EvaluateParams {
        EvaluateParams {
            input: self.input.clone(),
            output: self.output.clone(),
            assertions: self.assertions.clone(),
            grounding_check: self.grounding_check,
            hallucinations_check: self.hallucinations_check,
            instructions_following_check: self.instructions_following_check,
            pii_check: self.pii_check,
            prompt_injections: self.prompt_injections,
            content_moderation_check: self.content_moderation_check,
            tool_selection_quality_check: self.tool_selection_quality_check,
            ..Default::default()
        }
    }
}
