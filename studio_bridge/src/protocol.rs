//! Request/response protocol between the host and the chart worker.

use crate::chart::ChartModel;
use crate::types::{
    CanvasNode, ChartData, ChartId, ChartOptions, ChartType, DataPoint, ElementAtEvent, PanEvent,
    Point, PointerEvent, Scales, WheelEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operations the host can invoke on a worker-owned chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ChartRequest {
    #[serde(rename_all = "camelCase")]
    Construct {
        id: ChartId,
        node: CanvasNode,
        chart_type: ChartType,
        data: ChartData,
        options: ChartOptions,
        pixel_ratio: f64,
    },
    Update {
        id: ChartId,
        data: ChartData,
        options: ChartOptions,
        width: f64,
        height: f64,
    },
    Pointer { id: ChartId, event: PointerEvent },
    Wheel { id: ChartId, event: WheelEvent },
    Pan { id: ChartId, event: PanEvent },
    ResetZoom { id: ChartId },
    ElementsAtEvent { id: ChartId, point: Point },
    DatalabelAtEvent { id: ChartId, event: PointerEvent },
    Destroy { id: ChartId },
}

impl ChartRequest {
    pub fn chart_id(&self) -> ChartId {
        match self {
            ChartRequest::Construct { id, .. }
            | ChartRequest::Update { id, .. }
            | ChartRequest::Pointer { id, .. }
            | ChartRequest::Wheel { id, .. }
            | ChartRequest::Pan { id, .. }
            | ChartRequest::ResetZoom { id }
            | ChartRequest::ElementsAtEvent { id, .. }
            | ChartRequest::DatalabelAtEvent { id, .. }
            | ChartRequest::Destroy { id } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChartRequest::Construct { .. } => "construct",
            ChartRequest::Update { .. } => "update",
            ChartRequest::Pointer { .. } => "pointer",
            ChartRequest::Wheel { .. } => "wheel",
            ChartRequest::Pan { .. } => "pan",
            ChartRequest::ResetZoom { .. } => "resetZoom",
            ChartRequest::ElementsAtEvent { .. } => "elementsAtEvent",
            ChartRequest::DatalabelAtEvent { .. } => "datalabelAtEvent",
            ChartRequest::Destroy { .. } => "destroy",
        }
    }
}

/// Worker replies, one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ChartResponse {
    Constructed,
    Scales(Scales),
    Elements(Vec<ElementAtEvent>),
    Datalabel(Option<DataPoint>),
    Destroyed,

    /// The addressed chart does not exist (never constructed or destroyed)
    Unavailable,
}

/// Every chart owned by one worker, keyed by id.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    charts: HashMap<ChartId, ChartModel>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn contains(&self, id: ChartId) -> bool {
        self.charts.contains_key(&id)
    }

    /// Apply one request and produce its response.
    pub fn handle(&mut self, request: ChartRequest) -> ChartResponse {
        let id = request.chart_id();
        let op = request.name();

        match request {
            ChartRequest::Construct {
                node,
                chart_type,
                data,
                options,
                pixel_ratio,
                ..
            } => {
                let chart = ChartModel::new(node, chart_type, data, options, pixel_ratio);
                if self.charts.insert(id, chart).is_some() {
                    tracing::debug!(%id, "replaced existing chart");
                }
                tracing::debug!(%id, ?chart_type, "constructed chart");
                ChartResponse::Constructed
            }
            ChartRequest::Destroy { .. } => match self.charts.remove(&id) {
                Some(_) => {
                    tracing::debug!(%id, "destroyed chart");
                    ChartResponse::Destroyed
                }
                None => ChartResponse::Unavailable,
            },
            request => {
                let Some(chart) = self.charts.get_mut(&id) else {
                    tracing::debug!(%id, op, "request for unknown chart");
                    return ChartResponse::Unavailable;
                };
                match request {
                    ChartRequest::Update {
                        data,
                        options,
                        width,
                        height,
                        ..
                    } => ChartResponse::Scales(chart.update(data, options, width, height)),
                    ChartRequest::Pointer { event, .. } => ChartResponse::Scales(chart.pointer(&event)),
                    ChartRequest::Wheel { event, .. } => ChartResponse::Scales(chart.wheel(&event)),
                    ChartRequest::Pan { event, .. } => ChartResponse::Scales(chart.pan(&event)),
                    ChartRequest::ResetZoom { .. } => ChartResponse::Scales(chart.reset_zoom()),
                    ChartRequest::ElementsAtEvent { point, .. } => {
                        ChartResponse::Elements(chart.elements_at(&point))
                    }
                    ChartRequest::DatalabelAtEvent { event, .. } => {
                        ChartResponse::Datalabel(chart.datalabel_at(&event))
                    }
                    ChartRequest::Construct { .. } | ChartRequest::Destroy { .. } => {
                        ChartResponse::Unavailable
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dataset, PointerKind};

    fn construct(id: ChartId) -> ChartRequest {
        ChartRequest::Construct {
            id,
            node: CanvasNode { width: 200.0, height: 100.0 },
            chart_type: ChartType::Scatter,
            data: ChartData {
                datasets: vec![Dataset::new("a", vec![DataPoint::new(1.0, 2.0)])],
            },
            options: ChartOptions::default(),
            pixel_ratio: 1.0,
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut registry = ChartRegistry::new();
        let id = ChartId::from_seed(1);

        assert_eq!(registry.handle(construct(id)), ChartResponse::Constructed);
        assert!(registry.contains(id));

        let response = registry.handle(ChartRequest::Wheel {
            id,
            event: WheelEvent { x: 10.0, y: 10.0, delta_y: -1.0 },
        });
        assert!(matches!(response, ChartResponse::Scales(_)));

        assert_eq!(registry.handle(ChartRequest::Destroy { id }), ChartResponse::Destroyed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_chart_is_unavailable() {
        let mut registry = ChartRegistry::new();
        let id = ChartId::from_seed(2);
        let event = PointerEvent::new(PointerKind::Down, 0.0, 0.0);

        assert_eq!(
            registry.handle(ChartRequest::Pointer { id, event }),
            ChartResponse::Unavailable
        );
        assert_eq!(registry.handle(ChartRequest::Destroy { id }), ChartResponse::Unavailable);
    }

    #[test]
    fn test_request_wire_format() {
        let id = ChartId::from_seed(3);
        let request = ChartRequest::ElementsAtEvent { id, point: Point::new(1.0, 2.0) };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["op"], "elementsAtEvent");
        assert_eq!(value["point"]["x"], 1.0);

        let construct = serde_json::to_value(construct(id)).unwrap();
        assert_eq!(construct["op"], "construct");
        assert_eq!(construct["chartType"], "scatter");
        assert_eq!(construct["pixelRatio"], 1.0);

        let back: ChartRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }
}
