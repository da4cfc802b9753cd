//! Relation distribution radar.
//!
//! The widget is a small state machine: it starts in [`RadarView::Loading`]
//! and moves to exactly one of `Empty`, `Chart` or `Error` once the query
//! settles. A later reload goes through `Loading` again.

use crate::DistributionSource;
use crate::error::DashboardError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Shown instead of a chart when the distribution has no entries.
pub const EMPTY_MESSAGE: &str = "No entities of this type has been found.";

/// Radius of the outermost ring, in chart units.
pub const OUTER_RADIUS: f64 = 110.0;

const BAR_WIDTH: usize = 40;

/// What the widget is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarProps {
    pub entity_id: String,
    /// Restricts the other end of the relations; `None` means any type.
    pub entity_type: Option<String>,
    pub relation_type: Option<String>,
    pub field: String,
    pub resolve_inferences: bool,
    pub resolve_relation_type: Option<String>,
}

impl RadarProps {
    pub fn new(entity_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: None,
            relation_type: None,
            field: field.into(),
            resolve_inferences: false,
            resolve_relation_type: None,
        }
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    pub fn resolving(mut self, relation_type: impl Into<String>) -> Self {
        self.resolve_inferences = true;
        self.resolve_relation_type = Some(relation_type.into());
        self
    }

    /// Query variables for these props. The operation is always `count`.
    pub fn variables(&self) -> DistributionVariables {
        DistributionVariables {
            from_id: self.entity_id.clone(),
            to_types: self.entity_type.clone().map(|t| vec![t]),
            relation_type: self.relation_type.clone(),
            resolve_inferences: self.resolve_inferences,
            resolve_relation_type: self.resolve_relation_type.clone(),
            field: self.field.clone(),
            operation: "count".to_string(),
        }
    }

    pub fn title(&self) -> String {
        format!(
            "Distribution: {}",
            self.entity_type.as_deref().unwrap_or("all")
        )
    }
}

/// Variables of the distribution query, serialized in wire casing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionVariables {
    pub from_id: String,
    pub to_types: Option<Vec<String>>,
    pub relation_type: Option<String>,
    pub resolve_inferences: bool,
    pub resolve_relation_type: Option<String>,
    pub field: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPoint {
    pub label: String,
    pub value: f64,
}

/// A point of the radar polygon, centred on the chart with y growing down.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadarChart {
    pub points: Vec<DistributionPoint>,
    pub outer_radius: f64,
}

impl RadarChart {
    pub fn new(points: Vec<DistributionPoint>) -> Self {
        Self {
            points,
            outer_radius: OUTER_RADIUS,
        }
    }

    /// One vertex per point. The first axis points up and the others follow
    /// clockwise; the largest value touches the outer ring.
    pub fn vertices(&self) -> Vec<Vertex> {
        let count = self.points.len() as f64;
        let max = self.max_value();
        self.points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let angle = -PI / 2.0 + 2.0 * PI * i as f64 / count;
                let radius = if max > 0.0 {
                    point.value.max(0.0) / max * self.outer_radius
                } else {
                    0.0
                };
                Vertex {
                    label: point.label.clone(),
                    x: radius * angle.cos(),
                    y: radius * angle.sin(),
                }
            })
            .collect()
    }

    fn max_value(&self) -> f64 {
        self.points.iter().map(|p| p.value).fold(0.0, f64::max)
    }
}

/// The four things the widget can show.
#[derive(Debug, Clone, PartialEq)]
pub enum RadarView {
    Loading,
    Empty { message: String },
    Chart(RadarChart),
    Error { message: String },
}

impl RadarView {
    /// The settled view for a query outcome.
    pub fn from_result(result: Result<Vec<DistributionPoint>, DashboardError>) -> Self {
        match result {
            Ok(points) if points.is_empty() => Self::Empty {
                message: EMPTY_MESSAGE.to_string(),
            },
            Ok(points) => Self::Chart(RadarChart::new(points)),
            Err(err) => Self::Error {
                message: err.to_string(),
            },
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Radar widget bound to one entity.
#[derive(Debug, Clone)]
pub struct RadarWidget {
    props: RadarProps,
    view: RadarView,
}

impl RadarWidget {
    pub fn new(props: RadarProps) -> Self {
        Self {
            props,
            view: RadarView::Loading,
        }
    }

    pub fn props(&self) -> &RadarProps {
        &self.props
    }

    pub fn view(&self) -> &RadarView {
        &self.view
    }

    pub fn title(&self) -> String {
        self.props.title()
    }

    /// Runs the query against `source` and settles the view.
    pub async fn load(&mut self, source: &dyn DistributionSource) -> &RadarView {
        self.view = RadarView::Loading;
        let variables = self.props.variables();
        let result = source.distribution(&variables).await;
        match &result {
            Ok(points) => debug!(entity = %self.props.entity_id, points = points.len(), "radar loaded"),
            Err(err) => warn!(entity = %self.props.entity_id, error = %err, "radar query failed"),
        }
        self.view = RadarView::from_result(result);
        &self.view
    }

    /// Plain text rendering: the title, then the current view.
    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n", self.title());
        match &self.view {
            RadarView::Loading => out.push_str("Loading...\n"),
            RadarView::Empty { message } => {
                out.push_str(message);
                out.push('\n');
            }
            RadarView::Error { message } => {
                let _ = writeln!(out, "Error: {message}");
            }
            RadarView::Chart(chart) => {
                let max = chart.max_value();
                let width = chart.points.iter().map(|p| p.label.len()).max().unwrap_or(0);
                for point in &chart.points {
                    let filled = if max > 0.0 {
                        ((point.value.max(0.0) / max) * BAR_WIDTH as f64).round() as usize
                    } else {
                        0
                    };
                    let _ = writeln!(
                        out,
                        "{:<width$}  {:<bar$}  {}",
                        point.label,
                        "#".repeat(filled),
                        point.value,
                        bar = BAR_WIDTH,
                    );
                }
            }
        }
        out
    }
}
