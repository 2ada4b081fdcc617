//! Wire types for the evaluation API and their construction-time validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One tool invocation recorded inside a conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A single turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<LLMToolCall>>,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A tool the model was allowed to call, as a JSON-schema style definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Map<String, Value>,
}

/// Arguments for a named syntax check (e.g. `{"json": {"args": "strict"}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxCheckArgs {
    pub args: String,
}

/// Quality/speed trade-off selector applied per check category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    Speed,
    #[default]
    Balanced,
    Quality,
}

/// Which side of the exchange policy-style checks apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyTarget {
    Input,
    Output,
    #[default]
    Both,
}

/// Caller-facing knobs for [`crate::Client::evaluate`]. Every field is
/// optional; validation happens when the [`EvaluationRequest`] is built.
#[derive(Debug, Clone, Default)]
pub struct EvaluateParams {
    pub input: Option<String>,
    pub output: Option<String>,
    pub messages: Vec<LLMMessage>,
    pub available_tools: Vec<LLMToolDefinition>,
    pub assertions: Vec<String>,
    /// Deprecated: use `content_moderation_check`.
    pub dangerous_content_check: bool,
    pub grounding_check: bool,
    pub hallucinations_check: bool,
    /// Deprecated: use `content_moderation_check`.
    pub harassment_check: bool,
    /// Deprecated: use `content_moderation_check`.
    pub hate_speech_check: bool,
    pub instructions_following_check: bool,
    pub pii_check: bool,
    pub prompt_injections: bool,
    /// Deprecated: use `content_moderation_check`.
    pub sexual_content_check: bool,
    pub syntax_checks: Option<BTreeMap<String, SyntaxCheckArgs>>,
    pub tool_selection_quality_check: bool,
    pub content_moderation_check: bool,
    pub tsq_mode: ModelMode,
    pub consistency_mode: ModelMode,
    pub assertions_mode: ModelMode,
    pub grounding_mode: ModelMode,
    pub hallucinations_mode: ModelMode,
    pub grounding_multi_turn_mode: bool,
    pub policy_multi_turn_mode: bool,
    pub policy_target: PolicyTarget,
}

/// The outbound evaluation payload. Constructed fresh per call and
/// validated at construction; unset optionals are absent from the wire
/// form rather than serialized as null.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<LLMMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_tools: Vec<LLMToolDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<String>,
    pub dangerous_content_check: bool,
    pub grounding_check: bool,
    pub hallucinations_check: bool,
    pub harassment_check: bool,
    pub hate_speech_check: bool,
    pub instructions_following_check: bool,
    pub pii_check: bool,
    pub prompt_injections: bool,
    pub sexual_content_check: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_checks: Option<BTreeMap<String, SyntaxCheckArgs>>,
    pub tool_selection_quality_check: bool,
    pub content_moderation_check: bool,
    pub tsq_mode: ModelMode,
    pub consistency_mode: ModelMode,
    pub assertions_mode: ModelMode,
    pub grounding_mode: ModelMode,
    pub hallucinations_mode: ModelMode,
    pub grounding_multi_turn_mode: bool,
    pub policy_multi_turn_mode: bool,
    pub policy_target: PolicyTarget,
}

impl EvaluationRequest {
    /// Build and validate a request.
    ///
    /// Deprecated content sub-check flags fold additively into
    /// `content_moderation_check` before validation, so the canonical flag
    /// is stable for the lifetime of the request.
    pub fn new(params: EvaluateParams) -> Result<Self> {
        let content_moderation_check = params.content_moderation_check
            || params.dangerous_content_check
            || params.harassment_check
            || params.hate_speech_check
            || params.sexual_content_check;

        let request = Self {
            input: params.input,
            output: params.output,
            messages: params.messages,
            available_tools: params.available_tools,
            assertions: params.assertions,
            dangerous_content_check: params.dangerous_content_check,
            grounding_check: params.grounding_check,
            hallucinations_check: params.hallucinations_check,
            harassment_check: params.harassment_check,
            hate_speech_check: params.hate_speech_check,
            instructions_following_check: params.instructions_following_check,
            pii_check: params.pii_check,
            prompt_injections: params.prompt_injections,
            sexual_content_check: params.sexual_content_check,
            syntax_checks: params.syntax_checks,
            tool_selection_quality_check: params.tool_selection_quality_check,
            content_moderation_check,
            tsq_mode: params.tsq_mode,
            consistency_mode: params.consistency_mode,
            assertions_mode: params.assertions_mode,
            grounding_mode: params.grounding_mode,
            hallucinations_mode: params.hallucinations_mode,
            grounding_multi_turn_mode: params.grounding_multi_turn_mode,
            policy_multi_turn_mode: params.policy_multi_turn_mode,
            policy_target: params.policy_target,
        };
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        validate_subject(
            self.input.as_deref(),
            self.output.as_deref(),
            &self.messages,
        )?;

        if self.tool_selection_quality_check
            && (self.messages.is_empty() || self.available_tools.is_empty())
        {
            return Err(Error::Validation(
                "tool_selection_quality_check requires both messages and available_tools"
                    .to_owned(),
            ));
        }
        Ok(())
    }
}

/// Payload for re-running a previously defined evaluation by id.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationInvokeRequest {
    pub evaluation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<LLMMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_tools: Vec<LLMToolDefinition>,
}

/// Caller-facing knobs for [`crate::Client::invoke_evaluation`].
#[derive(Debug, Clone, Default)]
pub struct InvokeParams {
    pub evaluation_id: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub messages: Vec<LLMMessage>,
    pub available_tools: Vec<LLMToolDefinition>,
}

impl EvaluationInvokeRequest {
    pub fn new(params: InvokeParams) -> Result<Self> {
        validate_subject(
            params.input.as_deref(),
            params.output.as_deref(),
            &params.messages,
        )?;
        Ok(Self {
            evaluation_id: params.evaluation_id,
            input: params.input,
            output: params.output,
            messages: params.messages,
            available_tools: params.available_tools,
        })
    }
}

// Shared invariant: evaluating nothing is a caller error.
fn validate_subject(
    input: Option<&str>,
    output: Option<&str>,
    messages: &[LLMMessage],
) -> Result<()> {
    let has_input = input.is_some_and(|value| !value.is_empty());
    let has_output = output.is_some_and(|value| !value.is_empty());
    if messages.is_empty() && !has_input && !has_output {
        return Err(Error::Validation(
            "at least one of messages, input or output must be provided".to_owned(),
        ));
    }
    Ok(())
}

/// Normalize loosely-typed message records into [`LLMMessage`] values.
///
/// This is the only place untyped records are accepted; everything past
/// the API boundary works with typed messages.
pub fn messages_from_records(records: &[Value]) -> Result<Vec<LLMMessage>> {
    records
        .iter()
        .map(|record| {
            serde_json::from_value(record.clone())
                .map_err(|err| Error::Validation(format!("invalid message record: {err}")))
        })
        .collect()
}

/// One finding returned by the evaluation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub claim: String,
    pub confidence_score: i64,
    pub label: String,
    pub name: String,
    pub quote: String,
    pub reason: String,
    pub score: i64,
    #[serde(default)]
    pub flagged: bool,
}

/// Findings of one check category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResultItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub results: Vec<EvaluationResult>,
}

/// The inbound evaluation payload. Deserialization is strict: a missing
/// required field is a hard error, never a partial object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    #[serde(rename = "evaluationResults")]
    pub evaluation_results: Vec<EvaluationResultItem>,
    pub score: i64,
    pub status: String,
}
