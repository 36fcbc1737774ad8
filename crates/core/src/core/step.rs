//! Step records produced by a stepping engine.
//!
//! A [`Step`] is the wire shape (optional fields, camelCase JSON). Consumers never
//! probe those optional fields directly to decide what a step means; they ask for
//! its [`StepKind`] instead.

use serde::{Deserialize, Serialize};

/// One simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub episode: u64,
    /// Index of this step within its episode.
    #[serde(rename = "step")]
    pub step_index: u32,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering_info: Option<RenderingInfo>,
    /// Present exactly on the last step of an episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_result: Option<EpisodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    /// End-of-stream marker: the engine will produce nothing after this step.
    #[serde(default, skip_serializing_if = "is_false")]
    pub done: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub score: f64,
    #[serde(default)]
    pub steps: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Payload for the grid renderer. Opaque to the playback core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderingInfo {
    Layers {
        width: u32,
        height: u32,
        layers: Vec<RenderingLayer>,
    },
    Point(GridPoint),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderingLayer {
    pub name: String,
    pub points: Vec<GridPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
}

/// How the playback pipeline treats a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepKind {
    Regular,
    EpisodeEnd { score: f64 },
    /// Last step of the run. May also close an episode.
    Terminal { score: Option<f64> },
}

impl StepKind {
    pub fn score(self) -> Option<f64> {
        match self {
            StepKind::Regular => None,
            StepKind::EpisodeEnd { score } => Some(score),
            StepKind::Terminal { score } => score,
        }
    }

    pub fn ends_episode(self) -> bool {
        self.score().is_some()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepKind::Terminal { .. })
    }
}

impl Step {
    pub fn new(episode: u64, step_index: u32, action: impl Into<String>) -> Self {
        Self {
            episode,
            step_index,
            action: action.into(),
            rendering_info: None,
            episode_result: None,
            metrics: None,
            done: false,
        }
    }

    pub fn with_rendering_info(mut self, info: RenderingInfo) -> Self {
        self.rendering_info = Some(info);
        self
    }

    pub fn with_episode_result(mut self, score: f64, steps: u32) -> Self {
        self.episode_result = Some(EpisodeResult { score, steps });
        self
    }

    pub fn with_annotation(mut self, text: impl Into<String>) -> Self {
        self.metrics
            .get_or_insert_with(Metrics::default)
            .annotations
            .push(text.into());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.done = true;
        self
    }

    pub fn kind(&self) -> StepKind {
        let score = self.episode_result.map(|r| r.score);
        if self.done {
            return StepKind::Terminal { score };
        }
        match score {
            Some(score) => StepKind::EpisodeEnd { score },
            None => StepKind::Regular,
        }
    }

    pub fn annotations(&self) -> &[String] {
        self.metrics
            .as_ref()
            .map(|m| m.annotations.as_slice())
            .unwrap_or(&[])
    }
}
