use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Mutex;
use stixgraph_dashboard::{
    DashboardError, DashboardResult, DistributionPoint, DistributionSource,
    DistributionVariables, EMPTY_MESSAGE, OUTER_RADIUS, RadarChart, RadarProps, RadarView,
    RadarWidget,
};

/// Answers every query with a canned result and records the variables.
struct Canned {
    answer: Mutex<Option<DashboardResult<Vec<DistributionPoint>>>>,
    seen: Mutex<Vec<DistributionVariables>>,
}

impl Canned {
    fn new(answer: DashboardResult<Vec<DistributionPoint>>) -> Self {
        Self {
            answer: Mutex::new(Some(answer)),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DistributionSource for Canned {
    async fn distribution(
        &self,
        variables: &DistributionVariables,
    ) -> DashboardResult<Vec<DistributionPoint>> {
        self.seen.lock().unwrap().push(variables.clone());
        self.answer.lock().unwrap().take().unwrap_or(Ok(Vec::new()))
    }
}

fn point(label: &str, value: f64) -> DistributionPoint {
    DistributionPoint {
        label: label.to_string(),
        value,
    }
}

fn props() -> RadarProps {
    RadarProps::new("e-1", "entity_type")
        .with_entity_type("malware")
        .with_relation_type("uses")
}

#[test]
fn variables_follow_the_props() {
    let vars = serde_json::to_value(props().variables()).unwrap();
    assert_eq!(
        vars,
        json!({
            "fromId": "e-1",
            "toTypes": ["malware"],
            "relationType": "uses",
            "resolveInferences": false,
            "resolveRelationType": null,
            "field": "entity_type",
            "operation": "count",
        })
    );

    let untyped = RadarProps::new("e-1", "name").resolving("targets");
    let vars = serde_json::to_value(untyped.variables()).unwrap();
    assert_eq!(vars["toTypes"], serde_json::Value::Null);
    assert_eq!(vars["resolveInferences"], true);
    assert_eq!(vars["resolveRelationType"], "targets");
}

#[test]
fn a_new_widget_is_loading() {
    let widget = RadarWidget::new(props());
    assert_eq!(widget.view(), &RadarView::Loading);
    assert!(!widget.view().is_settled());
    assert_eq!(widget.title(), "Distribution: malware");
    assert_eq!(widget.render_text(), "Distribution: malware\nLoading...\n");
}

#[tokio::test]
async fn zero_rows_render_the_empty_message() {
    let source = Canned::new(Ok(Vec::new()));
    let mut widget = RadarWidget::new(props());
    let view = widget.load(&source).await.clone();

    assert_eq!(
        view,
        RadarView::Empty {
            message: EMPTY_MESSAGE.to_string()
        }
    );
    assert!(!matches!(view, RadarView::Loading | RadarView::Chart(_)));
    assert!(widget.render_text().ends_with("No entities of this type has been found.\n"));
    assert_eq!(source.seen.lock().unwrap()[0], props().variables());
}

#[tokio::test]
async fn rows_render_as_a_chart_in_response_order() {
    let rows = vec![point("tool", 1.0), point("malware", 4.0), point("attack-pattern", 2.0)];
    let source = Canned::new(Ok(rows.clone()));
    let mut widget = RadarWidget::new(props());
    widget.load(&source).await;

    let RadarView::Chart(chart) = widget.view() else {
        panic!("expected a chart, got {:?}", widget.view());
    };
    assert_eq!(chart.points, rows);
    assert_eq!(chart.outer_radius, OUTER_RADIUS);

    let text = widget.render_text();
    let labels: Vec<&str> = text
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(labels, vec!["tool", "malware", "attack-pattern"]);
}

#[tokio::test]
async fn failures_get_their_own_state() {
    let source = Canned::new(Err(DashboardError::Graphql("boom".into())));
    let mut widget = RadarWidget::new(props());
    widget.load(&source).await;

    assert_eq!(
        widget.view(),
        &RadarView::Error {
            message: "query failed: boom".into()
        }
    );
    assert!(widget.render_text().contains("Error: query failed: boom"));
}

#[tokio::test]
async fn reloading_replaces_the_previous_state() {
    let source = Canned::new(Ok(vec![point("tool", 3.0)]));
    let mut widget = RadarWidget::new(props());
    widget.load(&source).await;
    assert!(matches!(widget.view(), RadarView::Chart(_)));

    // The canned answer is used up; the next load sees no rows.
    widget.load(&source).await;
    assert!(matches!(widget.view(), RadarView::Empty { .. }));
    assert_eq!(source.seen.lock().unwrap().len(), 2);
}

#[test]
fn vertices_start_at_the_top_and_turn_clockwise() {
    let chart = RadarChart::new(vec![
        point("a", 10.0),
        point("b", 5.0),
        point("c", 10.0),
        point("d", 0.0),
    ]);
    let vertices = chart.vertices();
    let close = |got: f64, want: f64| (got - want).abs() < 1e-9;

    assert_eq!(vertices.len(), 4);
    assert!(close(vertices[0].x, 0.0) && close(vertices[0].y, -OUTER_RADIUS));
    assert!(close(vertices[1].x, OUTER_RADIUS / 2.0) && close(vertices[1].y, 0.0));
    assert!(close(vertices[2].x, 0.0) && close(vertices[2].y, OUTER_RADIUS));
    assert!(close(vertices[3].x, 0.0) && close(vertices[3].y, 0.0));
    assert_eq!(vertices[1].label, "b");
}

#[test]
fn all_zero_values_collapse_to_the_centre() {
    let chart = RadarChart::new(vec![point("a", 0.0), point("b", 0.0)]);
    assert!(chart.vertices().iter().all(|v| v.x == 0.0 && v.y == 0.0));
}
