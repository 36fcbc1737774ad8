//! Session lifecycle.
//!
//! ```text
//! Unloaded → Loading → AwaitingConfiguration → Ready → Running ⇄ Paused → Finished
//!                     (any non-terminal state) → Errored
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ControlState {
    Unloaded,
    Loading,
    AwaitingConfiguration,
    Ready,
    Running,
    Paused,
    Finished,
    Errored(String),
}

impl ControlState {
    pub fn name(&self) -> &'static str {
        match self {
            ControlState::Unloaded => "unloaded",
            ControlState::Loading => "loading",
            ControlState::AwaitingConfiguration => "awaiting_configuration",
            ControlState::Ready => "ready",
            ControlState::Running => "running",
            ControlState::Paused => "paused",
            ControlState::Finished => "finished",
            ControlState::Errored(_) => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlState::Finished | ControlState::Errored(_))
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::Errored(reason) => write!(f, "errored ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    EngineSpawned,
    EngineLoaded,
    ConfigAck { ok: bool },
    EngineReady,
    EngineError(String),
    Start,
    Stop,
    StepOnce,
    PlaybackFinished,
}

impl ControlEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ControlEvent::EngineSpawned => "engine_spawned",
            ControlEvent::EngineLoaded => "engine_loaded",
            ControlEvent::ConfigAck { .. } => "config_ack",
            ControlEvent::EngineReady => "engine_ready",
            ControlEvent::EngineError(_) => "engine_error",
            ControlEvent::Start => "start",
            ControlEvent::Stop => "stop",
            ControlEvent::StepOnce => "step",
            ControlEvent::PlaybackFinished => "playback_finished",
        }
    }

    fn from_engine(&self) -> bool {
        matches!(
            self,
            ControlEvent::EngineSpawned
                | ControlEvent::EngineLoaded
                | ControlEvent::ConfigAck { .. }
                | ControlEvent::EngineReady
                | ControlEvent::EngineError(_)
                | ControlEvent::PlaybackFinished
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("cannot handle `{event}` while {state}")]
    IllegalTransition {
        state: &'static str,
        event: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ControlMachine {
    state: ControlState,
}

impl Default for ControlMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMachine {
    pub fn new() -> Self {
        Self {
            state: ControlState::Unloaded,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Apply `event`. Illegal transitions leave the state untouched.
    ///
    /// Once terminal, engine-originated events are absorbed silently; user
    /// commands are rejected.
    pub fn apply(&mut self, event: ControlEvent) -> Result<&ControlState, ControlError> {
        use ControlEvent as E;
        use ControlState as S;

        if self.state.is_terminal() {
            if event.from_engine() {
                return Ok(&self.state);
            }
            return Err(self.illegal(&event));
        }

        let next = match (&self.state, &event) {
            (_, E::EngineError(reason)) => S::Errored(reason.clone()),
            (S::Unloaded, E::EngineSpawned) => S::Loading,
            (S::Loading, E::EngineLoaded) => S::AwaitingConfiguration,
            (S::AwaitingConfiguration, E::ConfigAck { ok: true })
            | (S::AwaitingConfiguration, E::EngineReady) => S::Ready,
            (S::AwaitingConfiguration, E::ConfigAck { ok: false }) => {
                S::Errored("engine rejected configuration".to_string())
            }
            (S::Ready, E::EngineReady) => S::Ready,
            (S::Ready | S::Paused | S::Running, E::Start) => S::Running,
            (S::Running | S::Paused, E::Stop) => S::Paused,
            (S::Ready, E::Stop) => S::Ready,
            // One advance; the running flag is left alone.
            (S::Running, E::StepOnce) => S::Running,
            (S::Ready | S::Paused, E::StepOnce) => S::Paused,
            (S::Ready | S::Running | S::Paused, E::PlaybackFinished) => S::Finished,
            _ => return Err(self.illegal(&event)),
        };
        self.state = next;
        Ok(&self.state)
    }

    fn illegal(&self, event: &ControlEvent) -> ControlError {
        ControlError::IllegalTransition {
            state: self.state.name(),
            event: event.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> ControlMachine {
        let mut m = ControlMachine::new();
        m.apply(ControlEvent::EngineSpawned).unwrap();
        m.apply(ControlEvent::EngineLoaded).unwrap();
        m
    }

    #[test]
    fn happy_path() {
        let mut m = loaded();
        assert_eq!(m.state(), &ControlState::AwaitingConfiguration);
        m.apply(ControlEvent::ConfigAck { ok: true }).unwrap();
        m.apply(ControlEvent::EngineReady).unwrap();
        assert_eq!(m.state(), &ControlState::Ready);

        m.apply(ControlEvent::Start).unwrap();
        assert_eq!(m.state(), &ControlState::Running);
        m.apply(ControlEvent::Stop).unwrap();
        assert_eq!(m.state(), &ControlState::Paused);
        m.apply(ControlEvent::StepOnce).unwrap();
        assert_eq!(m.state(), &ControlState::Paused);
        m.apply(ControlEvent::Start).unwrap();
        m.apply(ControlEvent::StepOnce).unwrap();
        assert_eq!(m.state(), &ControlState::Running);
        m.apply(ControlEvent::PlaybackFinished).unwrap();
        assert_eq!(m.state(), &ControlState::Finished);
        assert!(m.state().is_terminal());
    }

    #[test]
    fn rejected_configuration_is_terminal() {
        let mut m = loaded();
        m.apply(ControlEvent::ConfigAck { ok: false }).unwrap();
        assert!(matches!(m.state(), ControlState::Errored(_)));
        assert!(m.apply(ControlEvent::Start).is_err());
        // Later engine chatter is absorbed.
        m.apply(ControlEvent::EngineReady).unwrap();
        assert!(matches!(m.state(), ControlState::Errored(_)));
    }

    #[test]
    fn engine_error_keeps_the_reason() {
        let mut m = loaded();
        m.apply(ControlEvent::ConfigAck { ok: true }).unwrap();
        m.apply(ControlEvent::Start).unwrap();
        m.apply(ControlEvent::EngineError("worker panicked".to_string()))
            .unwrap();
        assert_eq!(
            m.state(),
            &ControlState::Errored("worker panicked".to_string())
        );
        assert_eq!(m.state().to_string(), "errored (worker panicked)");
        m.apply(ControlEvent::EngineError("second".to_string())).unwrap();
        assert_eq!(
            m.state(),
            &ControlState::Errored("worker panicked".to_string())
        );
    }

    #[test]
    fn start_before_ready_is_illegal() {
        let mut m = loaded();
        let err = m.apply(ControlEvent::Start).unwrap_err();
        assert_eq!(
            err,
            ControlError::IllegalTransition {
                state: "awaiting_configuration",
                event: "start"
            }
        );
        assert_eq!(m.state(), &ControlState::AwaitingConfiguration);
        assert!(m.apply(ControlEvent::StepOnce).is_err());
    }

    #[test]
    fn out_of_order_engine_events_are_rejected() {
        let mut m = ControlMachine::new();
        assert!(m.apply(ControlEvent::EngineLoaded).is_err());
        assert_eq!(m.state(), &ControlState::Unloaded);
    }
}
