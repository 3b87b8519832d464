//! Control messages sent by UI surfaces and the replies they get.
//!
//! Wire: `{ "type": "refreshOnce", "tabId": 7 }` → `{ "success": true, "stopped": false }`

use autorefresh_core::{TabId, Timer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reply text for a message whose `type` is missing or not recognised.
pub const UNKNOWN_MESSAGE_MSG: &str = "未知消息类型";

/// Reply text for an `addTimer` without a usable timer.
pub const INVALID_TIMER_MSG: &str = "无效的定时器数据";

/// Reply text when the durable store could not be read.
pub const STORAGE_UNAVAILABLE_MSG: &str = "storage unavailable";

const KNOWN_TYPES: &[&str] = &[
    "addTimer",
    "removeTimer",
    "refreshOnce",
    "togglePauseTimer",
    "pauseAllTimers",
    "resumeAllTimers",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    AddTimer {
        #[serde(default)]
        timer: Option<Timer>,
    },
    RemoveTimer {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    RefreshOnce {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    TogglePauseTimer {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    PauseAllTimers,
    ResumeAllTimers,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unknown message type: {0:?}")]
    UnknownType(Option<String>),

    #[error("invalid {kind} message: {reason}")]
    Invalid { kind: String, reason: String },
}

impl ControlMessage {
    /// Decode a raw message, telling an unknown `type` apart from a known
    /// type with a bad payload.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        match kind {
            Some(kind) if KNOWN_TYPES.contains(&kind.as_str()) => serde_json::from_value(value)
                .map_err(|e| MessageError::Invalid {
                    kind,
                    reason: e.to_string(),
                }),
            other => Err(MessageError::UnknownType(other)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::AddTimer { .. } => "addTimer",
            ControlMessage::RemoveTimer { .. } => "removeTimer",
            ControlMessage::RefreshOnce { .. } => "refreshOnce",
            ControlMessage::TogglePauseTimer { .. } => "togglePauseTimer",
            ControlMessage::PauseAllTimers => "pauseAllTimers",
            ControlMessage::ResumeAllTimers => "resumeAllTimers",
        }
    }
}

/// Why a `refreshOnce` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshRejection {
    NotFound,
    MaxRunsReached,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<RefreshRejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// Bare `{success:false}` (failed manual reload).
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn rejected(reason: RefreshRejection) -> Self {
        Self {
            success: false,
            message: Some(reason),
            ..Self::default()
        }
    }

    pub fn refreshed(stopped: bool) -> Self {
        Self {
            success: true,
            stopped: Some(stopped),
            ..Self::default()
        }
    }

    pub fn toggled(paused: Option<bool>) -> Self {
        Self {
            success: true,
            paused,
            ..Self::default()
        }
    }

    pub fn unknown() -> Self {
        Self::failure(UNKNOWN_MESSAGE_MSG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_variants_decode() {
        let msg = ControlMessage::from_value(json!({"type": "pauseAllTimers"})).unwrap();
        assert_eq!(msg, ControlMessage::PauseAllTimers);
        assert_eq!(msg.kind(), "pauseAllTimers");
    }

    #[test]
    fn add_timer_without_timer_decodes_to_none() {
        let msg = ControlMessage::from_value(json!({"type": "addTimer"})).unwrap();
        assert_eq!(msg, ControlMessage::AddTimer { timer: None });
        let msg = ControlMessage::from_value(json!({"type": "addTimer", "timer": null})).unwrap();
        assert_eq!(msg, ControlMessage::AddTimer { timer: None });
    }

    #[test]
    fn unknown_and_invalid_are_distinct() {
        assert!(matches!(
            ControlMessage::from_value(json!({"type": "explode"})),
            Err(MessageError::UnknownType(Some(_)))
        ));
        assert!(matches!(
            ControlMessage::from_value(json!({"tabId": 1})),
            Err(MessageError::UnknownType(None))
        ));
        assert!(matches!(
            ControlMessage::from_value(json!({"type": "removeTimer", "tabId": "x"})),
            Err(MessageError::Invalid { .. })
        ));
    }
}
