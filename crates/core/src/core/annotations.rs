//! Episode-keyed annotations for the chart overlay.

use crate::chart::{AxisUnit, ChartAnnotation};
use crate::downsample::Downsampler;
use crate::step::Step;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub episode: u64,
    pub text: String,
}

/// Append-only list of annotations in arrival order. No deduplication: two
/// annotations for the same episode are two markers.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTracker {
    entries: Vec<Annotation>,
}

impl AnnotationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, episode: u64, text: impl Into<String>) {
        self.entries.push(Annotation {
            episode,
            text: text.into(),
        });
    }

    /// Record every annotation carried by `step`. Returns how many were added.
    pub fn record_step(&mut self, step: &Step) -> usize {
        let texts = step.annotations();
        for text in texts {
            self.push(step.episode, text.clone());
        }
        texts.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.iter()
    }

    pub fn for_episode(&self, episode: u64) -> impl Iterator<Item = &Annotation> {
        self.entries.iter().filter(move |a| a.episode == episode)
    }

    /// Chart markers at `y = 0`, in arrival order.
    pub fn markers(&self, unit: AxisUnit, scores: &Downsampler) -> Vec<ChartAnnotation> {
        self.entries
            .iter()
            .map(|a| ChartAnnotation {
                x: episode_x(unit, scores, a.episode),
                y: 0.0,
                text: a.text.clone(),
            })
            .collect()
    }
}

/// X coordinate of `episode` on the score chart.
///
/// Score index `k` belongs to the `k`-th completed episode, and engines number
/// episodes from zero, so the episode number doubles as the raw score index.
pub fn episode_x(unit: AxisUnit, scores: &Downsampler, episode: u64) -> f64 {
    match unit {
        AxisUnit::Episode => episode as f64,
        AxisUnit::Bin => {
            let index = usize::try_from(episode).unwrap_or(usize::MAX);
            match scores.bin_for(index) {
                Some(bin) => bin as f64,
                None => 0.0,
            }
        }
    }
}
