//! The synchronous stepping contract an engine implements.
//!
//! Engines know nothing about channels or playback. A host (the daemon's engine
//! task, or a test) owns the engine, feeds it [`crate::protocol::Command`]s and
//! turns its output into [`crate::protocol::EngineEvent`]s.

use crate::step::Step;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("engine is not configured")]
    NotConfigured,
}

pub trait Engine: Send {
    /// Apply engine-defined parameters. Called before any stepping.
    fn configure(&mut self, parameters: &serde_json::Value) -> Result<(), EngineError>;

    /// Produce the next step, or `None` once the terminal step has been emitted.
    fn step(&mut self) -> Result<Option<Step>, EngineError>;

    /// Drain log lines accumulated since the last call.
    fn take_logs(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Advance up to `count` steps, stopping early after the terminal step.
pub fn step_batch<E: Engine + ?Sized>(engine: &mut E, count: u32) -> Result<Vec<Step>, EngineError> {
    let mut out = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        match engine.step()? {
            Some(step) => {
                let terminal = step.kind().is_terminal();
                out.push(step);
                if terminal {
                    break;
                }
            }
            None => break,
        }
    }
    Ok(out)
}
