//! A playback session: the single owner of the step buffer, the scheduler, the
//! score downsampler, the annotation tracker and the lifecycle state.
//!
//! The session does no I/O. The host feeds it engine events, user commands and
//! clock ticks, and forwards the returned [`SinkEvent`]s to whatever renders
//! them. Being single-owner, none of the state needs locking.

use crate::annotations::{episode_x, AnnotationTracker};
use crate::buffer::StepBuffer;
use crate::chart::{ChartConfig, ChartOverlay, ChartSeries, ChartShape};
use crate::control::{ControlError, ControlEvent, ControlMachine, ControlState};
use crate::downsample::Downsampler;
use crate::protocol::EngineEvent;
use crate::scheduler::{PlaybackScheduler, TickOutcome};
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub chart: ChartConfig,
}

fn default_fps() -> u32 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            chart: ChartConfig::default(),
        }
    }
}

/// Snapshot of the playback state for UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub ready: bool,
    pub running: bool,
    pub fps: u32,
    pub cursor: usize,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub len: usize,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub scores: usize,
    #[serde(default)]
    pub annotations: usize,
}

/// Payloads for the renderer and chart sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SinkEvent {
    Frame {
        cursor: usize,
        len: usize,
        step: Step,
    },
    Series(ChartSeries),
    Overlay(ChartOverlay),
    Log {
        message: String,
    },
    SessionError {
        message: String,
    },
}

/// What the host should do after an engine event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReaction {
    Nothing,
    /// The engine has loaded; send it the configuration.
    Configure,
    /// The engine accepted its configuration; playback may start.
    Ready,
    Appended(usize),
    Log(String),
    /// Engine failure, passed through verbatim.
    Failed(String),
    /// The event did not fit the current lifecycle state.
    Ignored(ControlError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub events: Vec<SinkEvent>,
}

#[derive(Debug)]
pub struct PlaybackSession {
    control: ControlMachine,
    buffer: StepBuffer,
    scheduler: PlaybackScheduler,
    scores: Downsampler,
    annotations: AnnotationTracker,
    chart: ChartConfig,
    engine_ready: bool,
    error: Option<String>,
}

impl PlaybackSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            control: ControlMachine::new(),
            buffer: StepBuffer::new(),
            scheduler: PlaybackScheduler::new(config.fps),
            scores: Downsampler::new(config.chart.max_points),
            annotations: AnnotationTracker::new(),
            chart: config.chart,
            engine_ready: false,
            error: None,
        }
    }

    pub fn engine_spawned(&mut self) -> Result<(), ControlError> {
        self.control.apply(ControlEvent::EngineSpawned)?;
        Ok(())
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) -> EngineReaction {
        match event {
            EngineEvent::Log { message } => EngineReaction::Log(message),
            EngineEvent::Error { message } => {
                self.fail(&message);
                EngineReaction::Failed(message)
            }
            EngineEvent::Loaded => match self.control.apply(ControlEvent::EngineLoaded) {
                Ok(_) => EngineReaction::Configure,
                Err(e) => EngineReaction::Ignored(e),
            },
            EngineEvent::ConfigAck { ok } => self.configured(ControlEvent::ConfigAck { ok }),
            EngineEvent::Ready => self.configured(ControlEvent::EngineReady),
            // Appended whatever the lifecycle state: a batch requested before a
            // stop still belongs to the session.
            EngineEvent::Result { result } => EngineReaction::Appended(self.buffer.append(result)),
        }
    }

    fn configured(&mut self, event: ControlEvent) -> EngineReaction {
        let was_awaiting = *self.control.state() == ControlState::AwaitingConfiguration;
        match self.control.apply(event) {
            Ok(ControlState::Ready) if was_awaiting => {
                self.engine_ready = true;
                EngineReaction::Ready
            }
            Ok(ControlState::Errored(reason)) if was_awaiting => {
                let reason = reason.clone();
                self.scheduler.stop();
                EngineReaction::Failed(reason)
            }
            Ok(_) => EngineReaction::Nothing,
            Err(e) => EngineReaction::Ignored(e),
        }
    }

    // Errored is absorbing; a terminal session just records the message. The
    // first verbatim engine message wins.
    fn fail(&mut self, reason: &str) {
        let _ = self
            .control
            .apply(ControlEvent::EngineError(reason.to_string()));
        self.scheduler.stop();
        self.engine_ready = false;
        self.error.get_or_insert_with(|| reason.to_string());
    }

    /// The engine's own message if it sent one, else the lifecycle reason.
    pub fn error(&self) -> Option<&str> {
        match (&self.error, self.control.state()) {
            (Some(message), _) => Some(message.as_str()),
            (None, ControlState::Errored(reason)) => Some(reason.as_str()),
            (None, _) => None,
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<(), ControlError> {
        self.control.apply(ControlEvent::Start)?;
        self.scheduler.start(now);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ControlError> {
        self.control.apply(ControlEvent::Stop)?;
        self.scheduler.stop();
        Ok(())
    }

    /// Advance exactly once, as soon as a step past the cursor is buffered.
    /// The running flag is left as it was.
    pub fn step_once(&mut self) -> Result<(), ControlError> {
        self.control.apply(ControlEvent::StepOnce)?;
        self.scheduler.request_single_step();
        Ok(())
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.scheduler.set_fps(fps);
    }

    pub fn wants_tick(&self) -> bool {
        self.scheduler.wants_tick() && !self.control.state().is_terminal()
    }

    /// Whether continuous playback should ask the engine for more steps.
    pub fn wants_more_steps(&self, max_backlog: usize) -> bool {
        *self.control.state() == ControlState::Running
            && !self.buffer.is_terminated()
            && self.backlog() < max_backlog
    }

    /// Buffered steps not yet played.
    pub fn backlog(&self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }
        self.buffer.len() - 1 - self.scheduler.cursor()
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        let outcome = self.scheduler.tick(now, &self.buffer);
        let mut events = Vec::new();
        match &outcome {
            TickOutcome::Advanced(advance) => {
                let series_changed = self.consume(advance.consumed.clone());
                if let Ok(step) = self.buffer.get(advance.to) {
                    events.push(SinkEvent::Frame {
                        cursor: advance.to,
                        len: self.buffer.len(),
                        step: step.clone(),
                    });
                }
                if series_changed {
                    events.push(SinkEvent::Series(self.scores.chart_series()));
                }
                events.push(SinkEvent::Overlay(self.overlay()));
                if advance.reached_end {
                    self.finish();
                }
            }
            TickOutcome::Finished => self.finish(),
            TickOutcome::Halted | TickOutcome::Deferred(_) => {}
        }
        TickReport { outcome, events }
    }

    // Feed scores and annotations of the steps an advance moved over. Returns
    // whether the score series changed.
    fn consume(&mut self, range: Range<usize>) -> bool {
        let mut changed = false;
        for step in self.buffer.range(range) {
            if let Some(score) = step.kind().score() {
                self.scores.push(score);
                changed = true;
            }
            self.annotations.record_step(step);
        }
        changed
    }

    fn finish(&mut self) {
        let _ = self.control.apply(ControlEvent::PlaybackFinished);
    }

    /// Annotation markers plus a vertical line at the current episode.
    pub fn overlay(&self) -> ChartOverlay {
        let axis = self.chart.axis;
        let mut overlay = ChartOverlay {
            annotations: self.annotations.markers(axis, &self.scores),
            shapes: Vec::new(),
        };
        if let Ok(step) = self.buffer.get(self.scheduler.cursor()) {
            let x = episode_x(axis, &self.scores, step.episode);
            overlay.shapes.push(ChartShape::vertical_line(
                x,
                self.chart.marker_height,
                &self.chart.marker_color,
            ));
        }
        overlay
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            ready: self.engine_ready,
            running: self.scheduler.is_running(),
            fps: self.scheduler.fps(),
            cursor: self.scheduler.cursor(),
            error: self.error().map(str::to_string),
            len: self.buffer.len(),
            state: self.control.state().name().to_string(),
            scores: self.scores.raw().len(),
            annotations: self.annotations.len(),
        }
    }

    pub fn control_state(&self) -> &ControlState {
        self.control.state()
    }

    pub fn buffer(&self) -> &StepBuffer {
        &self.buffer
    }

    pub fn scores(&self) -> &Downsampler {
        &self.scores
    }

    pub fn annotations(&self) -> &AnnotationTracker {
        &self.annotations
    }
}
