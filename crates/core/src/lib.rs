//! # spatium
//!
//! Playback pipeline for step-producing simulations.
//!
//! An engine produces [`step::Step`]s in batches. The consumer side appends
//! them to a [`buffer::StepBuffer`], replays them at a target frame rate with
//! a [`scheduler::PlaybackScheduler`], reduces per-episode scores to a bounded
//! chart series with a [`downsample::Downsampler`] and places textual
//! annotations on that chart with an [`annotations::AnnotationTracker`].
//! [`session::PlaybackSession`] ties these together behind the lifecycle in
//! [`control`].
//!
//! ## Quick Start
//!
//! ```
//! use spatium::prelude::*;
//! use std::time::Instant;
//!
//! let mut session = PlaybackSession::new(SessionConfig { fps: 0, ..SessionConfig::default() });
//! session.engine_spawned().unwrap();
//! session.handle_engine_event(EngineEvent::Loaded);
//! session.handle_engine_event(EngineEvent::ConfigAck { ok: true });
//!
//! let now = Instant::now();
//! session.start(now).unwrap();
//! session.handle_engine_event(EngineEvent::Result {
//!     result: vec![
//!         Step::new(0, 0, "right"),
//!         Step::new(0, 1, "down").with_episode_result(4.0, 2),
//!         Step::new(1, 0, "right"),
//!     ],
//! });
//! session.tick(now);
//! assert_eq!(session.state().cursor, 2);
//! assert_eq!(session.scores().raw(), &[4.0]);
//! ```
//!
//! ## Modules
//!
//! - [`step`]: The step record and its classification
//! - [`protocol`]: Engine command/event messages
//! - [`engine`]: The synchronous stepping contract
//! - [`session`]: Single-owner playback session

#[path = "core/step.rs"]
pub mod step;

#[path = "core/buffer.rs"]
pub mod buffer;

#[path = "core/chart.rs"]
pub mod chart;

#[path = "core/downsample.rs"]
pub mod downsample;

#[path = "core/annotations.rs"]
pub mod annotations;

#[path = "core/scheduler.rs"]
pub mod scheduler;

#[path = "core/protocol.rs"]
pub mod protocol;

#[path = "core/control.rs"]
pub mod control;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/session.rs"]
pub mod session;

/// Prelude module for convenient imports.
///
/// ```
/// use spatium::prelude::*;
/// ```
pub mod prelude {
    pub use crate::annotations::{Annotation, AnnotationTracker};
    pub use crate::buffer::{BufferError, StepBuffer};
    pub use crate::chart::{AxisUnit, ChartConfig, ChartOverlay, ChartSeries};
    pub use crate::control::{ControlError, ControlEvent, ControlMachine, ControlState};
    pub use crate::downsample::{DownsampledSeries, Downsampler};
    pub use crate::engine::{step_batch, Engine, EngineError};
    pub use crate::protocol::{Command, EngineEvent, ProtocolError};
    pub use crate::scheduler::{PlaybackScheduler, TickOutcome};
    pub use crate::session::{
        EngineReaction, PlaybackSession, PlaybackState, SessionConfig, SinkEvent,
    };
    pub use crate::step::{EpisodeResult, Metrics, RenderingInfo, Step, StepKind};
}
