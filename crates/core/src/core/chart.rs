//! Payloads for the external chart sink.

use serde::{Deserialize, Serialize};

/// Which x coordinate episode-keyed marks (annotations, the playback position
/// line) are plotted at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisUnit {
    /// Raw episode number.
    Episode,
    /// Index of the downsampled bin holding that episode's score. Matches the
    /// x values of [`ChartSeries`].
    #[default]
    Bin,
}

/// Replacement series for the chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnnotation {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartShape {
    #[serde(rename = "type")]
    pub kind: String,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
}

impl ChartShape {
    pub fn vertical_line(x: f64, height: f64, color: &str) -> Self {
        Self {
            kind: "line".to_string(),
            x0: x,
            y0: 0.0,
            x1: x,
            y1: height,
            color: color.to_string(),
        }
    }
}

/// Overlay update: annotation markers plus the current-position line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartOverlay {
    pub annotations: Vec<ChartAnnotation>,
    pub shapes: Vec<ChartShape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default)]
    pub axis: AxisUnit,
    #[serde(default = "default_marker_height")]
    pub marker_height: f64,
    #[serde(default = "default_marker_color")]
    pub marker_color: String,
}

fn default_max_points() -> usize {
    crate::downsample::DEFAULT_MAX_POINTS
}

fn default_marker_height() -> f64 {
    10.0
}

fn default_marker_color() -> String {
    "rgb(255, 0, 0)".to_string()
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            axis: AxisUnit::default(),
            marker_height: default_marker_height(),
            marker_color: default_marker_color(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_use_the_sink_field_names() {
        let json = serde_json::to_value(ChartShape::vertical_line(3.0, 10.0, "red")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "line", "x0": 3.0, "y0": 0.0, "x1": 3.0, "y1": 10.0, "color": "red"})
        );
    }

    #[test]
    fn axis_unit_uses_lowercase_names() {
        let unit: AxisUnit = serde_json::from_str(r#""episode""#).unwrap();
        assert_eq!(unit, AxisUnit::Episode);
        assert_eq!(serde_json::to_value(AxisUnit::Bin).unwrap(), "bin");
        assert!(serde_json::from_str::<AxisUnit>(r#""step""#).is_err());
    }
}
