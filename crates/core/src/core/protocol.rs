//! Messages exchanged with a stepping engine.
//!
//! On the wire every message is a JSON object tagged by `type`. Decoding checks
//! the tag first so an unrecognized kind is reported as such, separately from a
//! known kind with a malformed body.

use crate::step::Step;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Consumer → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Engine-defined configuration, passed through verbatim.
    #[serde(rename = "parameters")]
    Configure { model: serde_json::Value },
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fps: Option<u32>,
    },
    Stop,
    #[serde(rename = "step")]
    StepOnce,
    StepBatch { count: u32 },
}

const COMMAND_KINDS: &[&str] = &["parameters", "start", "stop", "step", "step_batch"];

/// Engine → consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Log { message: String },
    Error { message: String },
    Loaded,
    ConfigAck { ok: bool },
    Ready,
    Result { result: Vec<Step> },
}

const EVENT_KINDS: &[&str] = &["log", "error", "loaded", "config_ack", "ready", "result"];

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unrecognized message kind `{0}`")]
    UnknownKind(String),
    #[error("message has no `type` tag")]
    MissingKind,
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Command {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        decode_tagged(line, COMMAND_KINDS)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Configure { .. } => "parameters",
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::StepOnce => "step",
            Command::StepBatch { .. } => "step_batch",
        }
    }
}

impl EngineEvent {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        decode_tagged(line, EVENT_KINDS)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Log { .. } => "log",
            EngineEvent::Error { .. } => "error",
            EngineEvent::Loaded => "loaded",
            EngineEvent::ConfigAck { .. } => "config_ack",
            EngineEvent::Ready => "ready",
            EngineEvent::Result { .. } => "result",
        }
    }
}

fn decode_tagged<T: DeserializeOwned>(line: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingKind)?;
    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}
