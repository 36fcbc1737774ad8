//! Online fixed-width downsampling of the per-episode score series.
//!
//! The raw series grows without bound; the chart only ever receives
//! `max_points` bins. With `w = n / max_points`, bin `i` starts at
//! `floor(i * w)` and averages the raw values in `[start, start + w)`, which
//! for integer indices is `ceil(w)` values, clamped to the end of the series.
//! Neighbouring windows overlap when `w` is fractional.
//!
//! The whole series is recomputed on every new score. A running prefix sum
//! keeps that at O(max_points) per score, O(n * max_points) over a run. This
//! is the simple policy, not the asymptotically optimal one.
//!
//! While `n < max_points` the bins instead split the series into
//! `[floor(i * w), floor((i + 1) * w))`, so exactly `n` bins hold one score
//! each and the rest stay unset rather than averaging over an empty window.

use crate::chart::ChartSeries;
use std::ops::Range;

pub const DEFAULT_MAX_POINTS: usize = 100;

/// Fixed-length downsampled view. `None` marks an empty bin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownsampledSeries {
    points: Vec<Option<f64>>,
}

impl DownsampledSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, bin: usize) -> Option<f64> {
        self.points.get(bin).copied().flatten()
    }

    pub fn points(&self) -> &[Option<f64>] {
        &self.points
    }

    /// Number of bins holding a value.
    pub fn populated(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn iter_populated(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|v| (i, v)))
    }
}

#[derive(Debug, Clone)]
pub struct Downsampler {
    max_points: usize,
    raw: Vec<f64>,
    // prefix[i] = raw[0] + .. + raw[i - 1]
    prefix: Vec<f64>,
    series: DownsampledSeries,
}

impl Default for Downsampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl Downsampler {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            raw: Vec::new(),
            prefix: vec![0.0],
            series: DownsampledSeries::default(),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Record one completed episode's score and recompute the series.
    pub fn push(&mut self, score: f64) -> &DownsampledSeries {
        let total = self.prefix.last().copied().unwrap_or(0.0) + score;
        self.raw.push(score);
        self.prefix.push(total);
        self.recompute();
        &self.series
    }

    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    pub fn series(&self) -> &DownsampledSeries {
        &self.series
    }

    /// Real-valued window width, `n / max_points`.
    pub fn bin_width(&self) -> f64 {
        self.raw.len() as f64 / self.max_points as f64
    }

    /// Raw indices averaged into `bin` at the current length.
    pub fn bin_bounds(&self, bin: usize) -> Range<usize> {
        let n = self.raw.len();
        let m = self.max_points;
        let start = bin * n / m;
        if n < m {
            return start..(bin + 1) * n / m;
        }
        start..(start + n.div_ceil(m)).min(n)
    }

    /// The first bin whose window holds raw index `index`. Indices past the
    /// end map to a bin of the last score. `None` while the series is empty.
    pub fn bin_for(&self, index: usize) -> Option<usize> {
        let n = self.raw.len();
        if n == 0 {
            return None;
        }
        let index = index.min(n - 1);
        let m = self.max_points;
        if n < m {
            return Some(((index + 1) * m).div_ceil(n) - 1);
        }
        // Smallest bin whose window end `floor(i * n / m) + ceil(n / m)` passes `index`.
        let reach = (index + 1).saturating_sub(n.div_ceil(m));
        Some((reach * m).div_ceil(n))
    }

    /// Populated bins as `{x: bin index, y: mean}` for the chart sink.
    pub fn chart_series(&self) -> ChartSeries {
        let mut out = ChartSeries {
            x: Vec::with_capacity(self.max_points),
            y: Vec::with_capacity(self.max_points),
        };
        for (i, v) in self.series.iter_populated() {
            out.x.push(i as f64);
            out.y.push(v);
        }
        out
    }

    fn recompute(&mut self) {
        let mut points = std::mem::take(&mut self.series.points);
        points.clear();
        points.reserve(self.max_points);
        for bin in 0..self.max_points {
            let Range { start, end } = self.bin_bounds(bin);
            if end <= start {
                points.push(None);
                continue;
            }
            let sum = self.prefix[end] - self.prefix[start];
            points.push(Some(sum / (end - start) as f64));
        }
        self.series.points = points;
    }
}
