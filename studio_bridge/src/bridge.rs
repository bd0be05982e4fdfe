//! Host-side handle to one worker-owned chart.

use crate::error::BridgeError;
use crate::protocol::{ChartRequest, ChartResponse};
use crate::transport::ChartTransport;
use crate::types::{
    CanvasNode, ChartData, ChartId, ChartOptions, ChartType, DataPoint, ElementAtEvent, PanEvent,
    Point, PointerEvent, Scales, WheelEvent,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// `construct` has not succeeded yet
    Idle,
    Constructed,
    Destroyed,
}

/// Owned handle to one chart across the worker boundary.
///
/// Every method takes `&mut self`, so at most one call per chart is in
/// flight. Calls made before `construct` or after `destroy` do not reach the
/// worker and return an empty result, as do calls the worker cannot serve.
/// Dropping a handle whose chart is still live queues its teardown.
pub struct ChartBridge<T: ChartTransport> {
    transport: Arc<T>,
    id: ChartId,
    state: BridgeState,
}

impl<T: ChartTransport> ChartBridge<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_id(transport, ChartId::new())
    }

    pub fn with_id(transport: Arc<T>, id: ChartId) -> Self {
        Self {
            transport,
            id,
            state: BridgeState::Idle,
        }
    }

    pub fn id(&self) -> ChartId {
        self.id
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_constructed(&self) -> bool {
        self.state == BridgeState::Constructed
    }

    /// Create the chart on the worker.
    pub async fn construct(
        &mut self,
        node: CanvasNode,
        chart_type: ChartType,
        data: ChartData,
        options: ChartOptions,
        pixel_ratio: f64,
    ) -> Result<(), BridgeError> {
        let request = ChartRequest::Construct {
            id: self.id,
            node,
            chart_type,
            data,
            options,
            pixel_ratio,
        };
        match self.transport.request(request).await? {
            ChartResponse::Constructed => {
                self.state = BridgeState::Constructed;
                Ok(())
            }
            other => Err(BridgeError::unexpected(other)),
        }
    }

    pub async fn update(
        &mut self,
        data: ChartData,
        options: ChartOptions,
        width: f64,
        height: f64,
    ) -> Scales {
        let id = self.id;
        self.scales(ChartRequest::Update {
            id,
            data,
            options,
            width,
            height,
        })
        .await
    }

    pub async fn pointer(&mut self, event: PointerEvent) -> Scales {
        let id = self.id;
        self.scales(ChartRequest::Pointer { id, event }).await
    }

    pub async fn wheel(&mut self, event: WheelEvent) -> Scales {
        let id = self.id;
        self.scales(ChartRequest::Wheel { id, event }).await
    }

    pub async fn pan(&mut self, event: PanEvent) -> Scales {
        let id = self.id;
        self.scales(ChartRequest::Pan { id, event }).await
    }

    pub async fn reset_zoom(&mut self) -> Scales {
        let id = self.id;
        self.scales(ChartRequest::ResetZoom { id }).await
    }

    pub async fn elements_at_event(&mut self, point: Point) -> Vec<ElementAtEvent> {
        let id = self.id;
        match self.call(ChartRequest::ElementsAtEvent { id, point }).await {
            Some(ChartResponse::Elements(elements)) => elements,
            Some(other) => {
                tracing::warn!(chart = %self.id, response = ?other, "unexpected response");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub async fn datalabel_at_event(&mut self, event: PointerEvent) -> Option<DataPoint> {
        let id = self.id;
        match self.call(ChartRequest::DatalabelAtEvent { id, event }).await {
            Some(ChartResponse::Datalabel(data)) => data,
            Some(other) => {
                tracing::warn!(chart = %self.id, response = ?other, "unexpected response");
                None
            }
            None => None,
        }
    }

    /// Tear down the worker-side chart. Later calls are no-ops.
    pub async fn destroy(&mut self) {
        let id = self.id;
        if self.call(ChartRequest::Destroy { id }).await.is_some() {
            tracing::debug!(chart = %self.id, "chart destroyed");
        }
        self.state = BridgeState::Destroyed;
    }

    async fn scales(&mut self, request: ChartRequest) -> Scales {
        match self.call(request).await {
            Some(ChartResponse::Scales(scales)) => scales,
            Some(other) => {
                tracing::warn!(chart = %self.id, response = ?other, "unexpected response");
                Scales::new()
            }
            None => Scales::new(),
        }
    }

    /// One round-trip. `None` when the chart is not live on the worker or
    /// the worker cannot be reached.
    async fn call(&mut self, request: ChartRequest) -> Option<ChartResponse> {
        if !self.is_constructed() {
            tracing::debug!(chart = %self.id, op = request.name(), state = ?self.state, "chart not live, ignoring");
            return None;
        }
        match self.transport.request(request).await {
            Ok(ChartResponse::Unavailable) => {
                tracing::debug!(chart = %self.id, "worker has no such chart");
                None
            }
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(chart = %self.id, error = %e, "chart request failed");
                None
            }
        }
    }
}

impl<T: ChartTransport> Drop for ChartBridge<T> {
    fn drop(&mut self) {
        if self.is_constructed() {
            tracing::debug!(chart = %self.id, "handle dropped while live, releasing");
            self.transport.release(self.id);
        }
    }
}

impl<T: ChartTransport> std::fmt::Debug for ChartBridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartBridge")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokio_impl::WorkerTransport;
    use crate::transport::InProcessTransport;
    use crate::types::{Dataset, PointerKind, X_AXIS};
    use approx::assert_relative_eq;

    fn data() -> ChartData {
        ChartData {
            datasets: vec![Dataset::new(
                "speed",
                vec![DataPoint::new(0.0, 0.0), DataPoint::labeled(100.0, 10.0, "peak")],
            )],
        }
    }

    fn node() -> CanvasNode {
        CanvasNode { width: 448.0, height: 240.0 }
    }

    async fn constructed<T: ChartTransport>(transport: Arc<T>) -> ChartBridge<T> {
        let mut bridge = ChartBridge::new(transport);
        bridge
            .construct(node(), ChartType::Line, data(), ChartOptions::default(), 1.0)
            .await
            .unwrap();
        bridge
    }

    #[tokio::test]
    async fn test_calls_before_construct_are_empty() {
        let mut bridge = ChartBridge::new(Arc::new(InProcessTransport::new()));

        assert!(bridge.update(data(), ChartOptions::default(), 400.0, 200.0).await.is_empty());
        assert!(bridge
            .wheel(WheelEvent { x: 0.0, y: 0.0, delta_y: -1.0 })
            .await
            .is_empty());
        assert!(bridge.elements_at_event(Point::new(0.0, 0.0)).await.is_empty());
        assert!(bridge
            .datalabel_at_event(PointerEvent::new(PointerKind::Move, 0.0, 0.0))
            .await
            .is_none());
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_calls_after_destroy_are_empty() {
        let transport = Arc::new(InProcessTransport::new());
        let mut bridge = constructed(transport.clone()).await;
        assert_eq!(transport.chart_count(), 1);

        bridge.destroy().await;
        assert_eq!(transport.chart_count(), 0);
        assert!(bridge.pan(PanEvent { delta_x: 5.0, delta_y: 0.0 }).await.is_empty());
        bridge.destroy().await;
        assert_eq!(bridge.state(), BridgeState::Destroyed);
    }

    #[tokio::test]
    async fn test_dropping_live_handle_releases_chart() {
        let transport = Arc::new(InProcessTransport::new());
        let bridge = constructed(transport.clone()).await;
        let mut kept = constructed(transport.clone()).await;
        assert_eq!(transport.chart_count(), 2);

        drop(bridge);
        assert_eq!(transport.chart_count(), 1);

        kept.destroy().await;
        drop(kept);
        assert_eq!(transport.chart_count(), 0);
    }

    #[tokio::test]
    async fn test_wheel_zoom_through_worker() {
        let mut bridge = constructed(WorkerTransport::shared()).await;

        let scales = bridge.update(data(), ChartOptions::default(), 448.0, 240.0).await;
        assert_eq!(scales[X_AXIS].min, Some(0.0));
        assert_eq!(scales[X_AXIS].max, Some(100.0));

        let scales = bridge.wheel(WheelEvent { x: 48.0, y: 100.0, delta_y: -3.0 }).await;
        let x = scales[X_AXIS];
        assert_relative_eq!(x.min.unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(x.max.unwrap(), 90.0, epsilon = 1e-9);

        let scales = bridge.reset_zoom().await;
        assert_eq!(scales[X_AXIS].max, Some(100.0));
    }

    #[tokio::test]
    async fn test_hit_testing_through_worker() {
        let mut bridge = constructed(WorkerTransport::shared()).await;

        let elements = bridge.elements_at_event(Point::new(440.0, 8.0)).await;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].data.label.as_deref(), Some("peak"));

        let mut options = ChartOptions::default();
        options.datalabels = true;
        bridge.update(data(), options, 448.0, 240.0).await;
        // "peak" label sits 12px above the point at (440, 8)
        let label = bridge
            .datalabel_at_event(PointerEvent::new(PointerKind::Move, 440.0, -4.0))
            .await;
        assert_eq!(label.and_then(|d| d.label), Some("peak".to_string()));
    }

    #[tokio::test]
    async fn test_independent_charts_share_a_worker() {
        let transport = WorkerTransport::shared();
        let mut a = constructed(transport.clone()).await;
        let mut b = constructed(transport).await;

        a.pan(PanEvent { delta_x: 392.0, delta_y: 0.0 }).await;
        let scales_b = b.update(data(), ChartOptions::default(), 448.0, 240.0).await;
        assert_eq!(scales_b[X_AXIS].min, Some(0.0));

        let scales_a = a.update(data(), ChartOptions::default(), 448.0, 240.0).await;
        assert_relative_eq!(scales_a[X_AXIS].min.unwrap(), -100.0, epsilon = 1e-9);
    }
}
