use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PilotResult;

/// Input channel used for one action attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Trusted pointer or keyboard input at the element.
    #[default]
    Pointer,
    /// DOM events dispatched on the element, bypassing hit testing.
    SyntheticEvent,
    /// Keyboard shortcut that reaches the same UI state.
    Hotkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No candidate of the strategy ever resolved.
    NotFound,
    /// Every modality on the ladder was tried without success.
    ActionExhausted,
    /// The action ran but its post-condition never appeared.
    PostConditionFailed,
}

/// Result of one [`crate::api::ActionExecutor::perform`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub target: String,
    pub succeeded: bool,
    pub strategy_index_used: Option<usize>,
    /// Modality of the last attempt made.
    pub modality_used: Modality,
    pub error: Option<ErrorKind>,
    pub attempts: u32,
}

impl ActionOutcome {
    #[must_use]
    pub fn success(
        target: impl Into<String>,
        strategy_index: Option<usize>,
        modality: Modality,
        attempts: u32,
    ) -> Self {
        Self {
            target: target.into(),
            succeeded: true,
            strategy_index_used: strategy_index,
            modality_used: modality,
            error: None,
            attempts,
        }
    }

    #[must_use]
    pub fn failure(
        target: impl Into<String>,
        error: ErrorKind,
        strategy_index: Option<usize>,
        modality: Modality,
        attempts: u32,
    ) -> Self {
        Self {
            target: target.into(),
            succeeded: false,
            strategy_index_used: strategy_index,
            modality_used: modality,
            error: Some(error),
            attempts,
        }
    }
}

/// Where in a run a recoverable failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Suppression,
    Symbol,
    Timeframe,
    IndicatorClear,
    IndicatorAdd,
    IndicatorParams,
    Drawing,
    Annotation,
}

/// A condition that degraded the run without aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableFailure {
    pub stage: FailureStage,
    pub target: String,
    pub detail: String,
}

impl RecoverableFailure {
    #[must_use]
    pub fn new(stage: FailureStage, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage,
            target: target.into(),
            detail: detail.into(),
        }
    }
}

/// Uniform result shape handed to the dispatch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ResultEnvelope {
    /// `file` is lifted from a top-level `"file"` string in the payload.
    #[must_use]
    pub fn from_result<T: Serialize>(result: PilotResult<T>) -> Self {
        match result {
            Ok(payload) => match serde_json::to_value(&payload) {
                Ok(data) => Self {
                    ok: true,
                    file: data
                        .get("file")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    error: None,
                    data,
                },
                Err(err) => Self {
                    ok: false,
                    file: None,
                    error: Some(format!("result serialization failed: {err}")),
                    data: Value::Null,
                },
            },
            Err(err) => Self {
                ok: false,
                file: None,
                error: Some(err.to_string()),
                data: Value::Null,
            },
        }
    }
}
