//! The session task: sole owner of the [`PlaybackSession`] and the engine
//! channel. Clients reach it through a [`SessionHandle`].

use crate::channel::EngineChannel;
use crate::config::RuntimeConfig;
use serde::{Deserialize, Serialize};
use spatium::protocol::EngineEvent;
use spatium::scheduler::TickOutcome;
use spatium::session::{EngineReaction, PlaybackSession, PlaybackState, SinkEvent};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SINK_CAPACITY: usize = 1024;
const REQUEST_QUEUE: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub playback: PlaybackState,
    pub backlog: usize,
    pub last_score: Option<f64>,
    pub mean_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Start,
    Stop,
    Step,
    SetFramerate { fps: u32 },
}

enum Envelope {
    State(oneshot::Sender<StateSnapshot>),
    Control(ControlRequest, oneshot::Sender<Result<String, String>>),
}

#[derive(Debug, thiserror::Error)]
#[error("session has ended")]
pub struct SessionGone;

#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Envelope>,
    sink: broadcast::Sender<SinkEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub async fn state(&self) -> Result<StateSnapshot, SessionGone> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Envelope::State(tx))
            .await
            .map_err(|_| SessionGone)?;
        rx.await.map_err(|_| SessionGone)
    }

    pub async fn control(&self, request: ControlRequest) -> Result<String, String> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Envelope::Control(request, tx))
            .await
            .map_err(|_| SessionGone.to_string())?;
        rx.await.map_err(|_| SessionGone.to_string())?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sink.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Start the session task. The returned join handle completes once the
/// engine has been shut down.
pub fn spawn_session(
    config: RuntimeConfig,
    channel: EngineChannel,
) -> (SessionHandle, JoinHandle<()>) {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
    let (sink, _) = broadcast::channel(SINK_CAPACITY);
    let cancel = CancellationToken::new();
    let handle = SessionHandle {
        requests: requests_tx,
        sink: sink.clone(),
        cancel: cancel.clone(),
    };
    let runner = Runner {
        session: PlaybackSession::new(config.session_config()),
        channel,
        sink,
        config,
    };
    let task = tokio::spawn(runner.run(requests_rx, cancel));
    (handle, task)
}

struct Runner {
    session: PlaybackSession,
    channel: EngineChannel,
    sink: broadcast::Sender<SinkEvent>,
    config: RuntimeConfig,
}

impl Runner {
    async fn run(mut self, mut requests: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
        if let Err(e) = self.session.engine_spawned() {
            error!("Session could not start: {}", e);
        }
        let mut clock = tokio::time::interval(Duration::from_millis(self.config.tick_ms.max(1)));
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut engine_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.channel.recv(), if engine_open => match event {
                    Some(event) => self.on_engine_event(event),
                    None => {
                        engine_open = false;
                        self.on_engine_event(EngineEvent::Error {
                            message: "engine exited".to_string(),
                        });
                    }
                },
                Some(envelope) = requests.recv() => self.on_request(envelope),
                now = clock.tick(), if self.session.wants_tick() => self.on_tick(now.into_std()),
            }

            if engine_open
                && self.channel.is_ready()
                && self.channel.outstanding() == 0
                && self.session.wants_more_steps(self.config.max_backlog)
            {
                if let Err(e) = self.channel.step_batch(self.config.batch_size) {
                    warn!("Step request failed: {}", e);
                }
            }
        }

        // The engine goes first; the buffers die with `self`.
        let Runner { channel, .. } = self;
        channel.shutdown().await;
        info!("Session ended");
    }

    fn publish(&self, event: SinkEvent) {
        // No subscribers is fine.
        let _ = self.sink.send(event);
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match self.session.handle_engine_event(event) {
            EngineReaction::Nothing => {}
            EngineReaction::Configure => {
                info!("Engine loaded, sending configuration");
                if let Err(e) = self.channel.configure(self.config.engine.clone()) {
                    error!("Could not configure engine: {}", e);
                }
            }
            EngineReaction::Ready => {
                info!("Engine ready");
                if self.config.autostart {
                    match self.start() {
                        Ok(message) => info!("{}", message),
                        Err(e) => warn!("Autostart failed: {}", e),
                    }
                }
            }
            EngineReaction::Appended(n) => {
                debug!("Appended {} steps ({} buffered)", n, self.session.buffer().len())
            }
            EngineReaction::Log(message) => {
                info!(target: "engine", "{}", message);
                self.publish(SinkEvent::Log { message });
            }
            EngineReaction::Failed(message) => {
                error!("Engine failure: {}", message);
                self.publish(SinkEvent::SessionError { message });
            }
            EngineReaction::Ignored(e) => warn!("Ignoring engine event: {}", e),
        }
    }

    fn on_request(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::State(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Envelope::Control(request, reply) => {
                let result = match request {
                    ControlRequest::Start => self.start(),
                    ControlRequest::Stop => self.stop(),
                    ControlRequest::Step => self.step_once(),
                    ControlRequest::SetFramerate { fps } => {
                        self.session.set_fps(fps);
                        Ok(format!("Framerate set to {fps}"))
                    }
                };
                let _ = reply.send(result);
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let report = self.session.tick(now);
        match &report.outcome {
            TickOutcome::Advanced(advance) if advance.reached_end => {
                info!("Playback finished at step {}", advance.to)
            }
            TickOutcome::Advanced(advance) if advance.fast_forwarded => {
                debug!("Fast-forwarded {} -> {}", advance.from, advance.to)
            }
            _ => {}
        }
        for event in report.events {
            self.publish(event);
        }
    }

    fn start(&mut self) -> Result<String, String> {
        self.session
            .start(Instant::now())
            .map_err(|e| e.to_string())?;
        let fps = self.session.state().fps;
        self.channel.start(Some(fps)).map_err(|e| e.to_string())?;
        Ok(format!("Playback started at {fps} fps"))
    }

    fn stop(&mut self) -> Result<String, String> {
        self.session.stop().map_err(|e| e.to_string())?;
        self.channel.stop().map_err(|e| e.to_string())?;
        Ok("Playback stopped".to_string())
    }

    fn step_once(&mut self) -> Result<String, String> {
        let running = self.session.state().running;
        self.session.step_once().map_err(|e| e.to_string())?;
        if !running {
            self.channel.step_once().map_err(|e| e.to_string())?;
        }
        Ok("Stepped".to_string())
    }

    fn snapshot(&self) -> StateSnapshot {
        let raw = self.session.scores().raw();
        StateSnapshot {
            playback: self.session.state(),
            backlog: self.session.backlog(),
            last_score: raw.last().copied(),
            mean_score: (!raw.is_empty()).then(|| raw.iter().sum::<f64>() / raw.len() as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spatium_games::FoodGridEngine;
    use tokio::time::{sleep, timeout};

    fn fast_config(engine: serde_json::Value) -> RuntimeConfig {
        RuntimeConfig {
            target_fps: 0,
            tick_ms: 1,
            batch_size: 16,
            engine,
            ..RuntimeConfig::default()
        }
    }

    async fn wait_for_state(handle: &SessionHandle, state: &str) -> StateSnapshot {
        timeout(Duration::from_secs(10), async {
            loop {
                let snapshot = handle.state().await.expect("session alive");
                if snapshot.playback.state == state {
                    return snapshot;
                }
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("state reached in time")
    }

    #[tokio::test]
    async fn plays_a_short_run_to_the_end() {
        let config = fast_config(json!({"size": 3, "maxEpisodes": 3, "seed": 4}));
        let (handle, task) = spawn_session(config, EngineChannel::spawn(FoodGridEngine::new()));
        let mut sink = handle.subscribe();

        let done = wait_for_state(&handle, "finished").await;
        assert_eq!(done.playback.scores, 3);
        assert_eq!(done.playback.cursor + 1, done.playback.len);
        assert_eq!(done.backlog, 0);
        assert!(done.mean_score.is_some());

        let mut frames = 0;
        while let Ok(event) = sink.try_recv() {
            if matches!(event, SinkEvent::Frame { .. }) {
                frames += 1;
            }
        }
        assert!(frames > 0);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_engine_parameters_error_the_session() {
        let config = fast_config(json!({"size": 1}));
        let (handle, task) = spawn_session(config, EngineChannel::spawn(FoodGridEngine::new()));

        let errored = wait_for_state(&handle, "errored").await;
        let message = errored.playback.error.unwrap();
        assert!(message.contains("size must be at least 2"), "{message}");
        assert!(handle.control(ControlRequest::Start).await.is_err());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn manual_stepping_while_paused() {
        let mut config = fast_config(json!({"size": 4, "maxEpisodes": 50, "seed": 9}));
        config.autostart = false;
        let (handle, task) = spawn_session(config, EngineChannel::spawn(FoodGridEngine::new()));

        wait_for_state(&handle, "ready").await;
        handle.control(ControlRequest::Step).await.unwrap();
        let paused = wait_for_state(&handle, "paused").await;
        assert!(!paused.playback.running);

        // One step requested, one step appended and shown.
        timeout(Duration::from_secs(5), async {
            while handle.state().await.unwrap().playback.len < 1 {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        sleep(Duration::from_millis(20)).await;
        let s = handle.state().await.unwrap();
        assert_eq!(s.playback.len, 1);
        assert_eq!(s.playback.cursor, 0);

        handle.control(ControlRequest::Start).await.unwrap();
        assert!(handle.state().await.unwrap().playback.running);
        handle.control(ControlRequest::Stop).await.unwrap();
        assert!(!handle.state().await.unwrap().playback.running);

        handle.shutdown();
        task.await.unwrap();
    }
}
