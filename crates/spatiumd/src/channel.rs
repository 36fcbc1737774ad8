//! Owned handle to an engine running on its own blocking task.
//!
//! Commands and events cross as encoded JSON lines over unbounded mpsc
//! channels, the same shape they would have over a pipe or a worker boundary.
//! Lines that do not decode are logged and skipped.

use spatium::engine::{step_batch, Engine};
use spatium::protocol::{Command, EngineEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("engine is not ready")]
    NotReady,
    #[error("engine has been stopped")]
    Stopped,
    #[error("engine channel closed")]
    Closed,
}

#[derive(Debug)]
pub struct EngineChannel {
    commands: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<String>,
    task: Option<JoinHandle<()>>,
    ready: bool,
    stopped: bool,
    // Step requests whose `Result` has not arrived yet.
    outstanding: u32,
}

impl EngineChannel {
    pub fn spawn<E: Engine + 'static>(engine: E) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || run_engine(engine, command_rx, event_tx));
        let mut channel = Self::from_parts(command_tx, event_rx);
        channel.task = Some(task);
        channel
    }

    /// Wrap raw line channels; the other ends play the engine.
    pub fn from_parts(
        commands: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            commands,
            events,
            task: None,
            ready: false,
            stopped: false,
            outstanding: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    fn send(&self, command: &Command) -> Result<(), ChannelError> {
        let line = command.encode().map_err(|e| {
            error!("Cannot encode {} command: {}", command.kind(), e);
            ChannelError::Closed
        })?;
        self.commands.send(line).map_err(|_| ChannelError::Closed)
    }

    pub fn configure(&mut self, parameters: serde_json::Value) -> Result<(), ChannelError> {
        self.send(&Command::Configure { model: parameters })
    }

    pub fn start(&mut self, fps: Option<u32>) -> Result<(), ChannelError> {
        if !self.ready {
            return Err(ChannelError::NotReady);
        }
        self.send(&Command::Start { fps })?;
        self.stopped = false;
        Ok(())
    }

    /// Batches already requested are still answered and delivered.
    pub fn stop(&mut self) -> Result<(), ChannelError> {
        self.stopped = true;
        self.send(&Command::Stop)
    }

    /// One step on explicit request. Allowed while stopped.
    pub fn step_once(&mut self) -> Result<(), ChannelError> {
        if !self.ready {
            return Err(ChannelError::NotReady);
        }
        self.send(&Command::StepOnce)?;
        self.outstanding += 1;
        Ok(())
    }

    pub fn step_batch(&mut self, count: u32) -> Result<(), ChannelError> {
        if !self.ready {
            return Err(ChannelError::NotReady);
        }
        if self.stopped {
            return Err(ChannelError::Stopped);
        }
        self.send(&Command::StepBatch { count })?;
        self.outstanding += 1;
        Ok(())
    }

    /// Next decodable event, or `None` once the engine side has hung up.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            let line = self.events.recv().await?;
            match EngineEvent::decode(&line) {
                Ok(event) => {
                    self.observe(&event);
                    return Some(event);
                }
                Err(e) => warn!("Ignoring engine message: {}", e),
            }
        }
    }

    fn observe(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::ConfigAck { ok: true } | EngineEvent::Ready => self.ready = true,
            EngineEvent::ConfigAck { ok: false } => self.ready = false,
            // A failed step request is answered with an error instead of a result.
            EngineEvent::Result { .. } | EngineEvent::Error { .. } => {
                self.outstanding = self.outstanding.saturating_sub(1)
            }
            EngineEvent::Log { .. } | EngineEvent::Loaded => {}
        }
    }

    /// Close the command stream and wait for the engine task to exit.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Engine task failed: {}", e);
            }
        }
    }
}

fn run_engine<E: Engine>(
    mut engine: E,
    mut commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<String>,
) {
    let emit = |event: EngineEvent| -> bool {
        match event.encode() {
            Ok(line) => events.send(line).is_ok(),
            Err(e) => {
                error!("Cannot encode {} event: {}", event.kind(), e);
                true
            }
        }
    };
    let flush_logs = |engine: &mut E| -> bool {
        engine
            .take_logs()
            .into_iter()
            .all(|message| emit(EngineEvent::Log { message }))
    };

    if !emit(EngineEvent::Loaded) {
        return;
    }
    while let Some(line) = commands.blocking_recv() {
        let command = match Command::decode(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Engine ignoring command: {}", e);
                continue;
            }
        };
        debug!("Engine received {}", command.kind());

        let delivered = match command {
            Command::Configure { model } => match engine.configure(&model) {
                Ok(()) => {
                    flush_logs(&mut engine)
                        && emit(EngineEvent::ConfigAck { ok: true })
                        && emit(EngineEvent::Ready)
                }
                Err(e) => {
                    flush_logs(&mut engine)
                        && emit(EngineEvent::Error {
                            message: e.to_string(),
                        })
                        && emit(EngineEvent::ConfigAck { ok: false })
                }
            },
            // The engine is pull-driven; pacing lives with the consumer.
            Command::Start { .. } | Command::Stop => true,
            Command::StepOnce => answer(&mut engine, 1, &emit, &flush_logs),
            Command::StepBatch { count } => answer(&mut engine, count, &emit, &flush_logs),
        };
        if !delivered {
            break;
        }
    }
    debug!("Engine task exiting");
}

fn answer<E: Engine>(
    engine: &mut E,
    count: u32,
    emit: &impl Fn(EngineEvent) -> bool,
    flush_logs: &impl Fn(&mut E) -> bool,
) -> bool {
    let result = step_batch(engine, count);
    if !flush_logs(engine) {
        return false;
    }
    match result {
        Ok(steps) => emit(EngineEvent::Result { result: steps }),
        Err(e) => emit(EngineEvent::Error {
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spatium::engine::EngineError;
    use spatium::step::Step;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Produces one step per token received on `gate`.
    struct GatedEngine {
        gate: std_mpsc::Receiver<()>,
        produced: u32,
    }

    impl Engine for GatedEngine {
        fn configure(&mut self, parameters: &serde_json::Value) -> Result<(), EngineError> {
            if parameters.get("reject").is_some() {
                return Err(EngineError::InvalidParameters("rejected on request".to_string()));
            }
            Ok(())
        }

        fn step(&mut self) -> Result<Option<Step>, EngineError> {
            if self.gate.recv().is_err() {
                return Ok(None);
            }
            self.produced += 1;
            Ok(Some(Step::new(0, self.produced, "wait")))
        }
    }

    async fn next(channel: &mut EngineChannel) -> EngineEvent {
        timeout(Duration::from_secs(5), channel.recv())
            .await
            .expect("engine event in time")
            .expect("engine still connected")
    }

    fn gated() -> (EngineChannel, std_mpsc::Sender<()>) {
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let channel = EngineChannel::spawn(GatedEngine {
            gate: gate_rx,
            produced: 0,
        });
        (channel, gate_tx)
    }

    #[tokio::test]
    async fn start_requires_ready() {
        let (mut channel, _gate) = gated();
        assert_eq!(next(&mut channel).await, EngineEvent::Loaded);
        assert!(matches!(channel.start(None), Err(ChannelError::NotReady)));
        assert!(matches!(channel.step_once(), Err(ChannelError::NotReady)));

        channel.configure(json!({})).unwrap();
        assert_eq!(next(&mut channel).await, EngineEvent::ConfigAck { ok: true });
        assert_eq!(next(&mut channel).await, EngineEvent::Ready);
        assert!(channel.is_ready());
        channel.start(Some(30)).unwrap();
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_configuration_reports_the_reason() {
        let (mut channel, _gate) = gated();
        next(&mut channel).await;
        channel.configure(json!({"reject": true})).unwrap();
        assert_eq!(
            next(&mut channel).await,
            EngineEvent::Error {
                message: "invalid parameters: rejected on request".to_string()
            }
        );
        assert_eq!(next(&mut channel).await, EngineEvent::ConfigAck { ok: false });
        assert!(!channel.is_ready());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn stop_does_not_drop_a_batch_in_flight() {
        let (mut channel, gate) = gated();
        next(&mut channel).await;
        channel.configure(json!({})).unwrap();
        next(&mut channel).await;
        next(&mut channel).await;
        channel.start(None).unwrap();

        channel.step_batch(2).unwrap();
        assert_eq!(channel.outstanding(), 1);
        channel.stop().unwrap();
        assert!(matches!(channel.step_batch(1), Err(ChannelError::Stopped)));

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        match next(&mut channel).await {
            EngineEvent::Result { result } => assert_eq!(result.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(channel.outstanding(), 0);

        // An explicit single step is still honored while stopped.
        channel.step_once().unwrap();
        gate.send(()).unwrap();
        match next(&mut channel).await {
            EngineEvent::Result { result } => {
                assert_eq!(result.len(), 1);
                assert_eq!(result[0].step_index, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        drop(gate);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn undecodable_lines_are_skipped() {
        let (commands_tx, _commands_rx) = mpsc::unbounded_channel::<String>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut channel = EngineChannel::from_parts(commands_tx, events_rx);

        for line in [
            r#"{"type":"telemetry","fps":3}"#,
            "not json",
            r#"{"type":"log"}"#,
            r#"{"type":"loaded"}"#,
        ] {
            events_tx.send(line.to_string()).unwrap();
        }
        drop(events_tx);
        assert_eq!(channel.recv().await, Some(EngineEvent::Loaded));
        assert_eq!(channel.recv().await, None);
    }
}
