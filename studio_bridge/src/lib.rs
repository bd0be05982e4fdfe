//! Studio Chart Bridge
//!
//! Interactive charts live on a worker that owns the chart instances; the
//! host only holds `ChartBridge` handles. Every operation is a
//! request/response round-trip that returns the resulting scale snapshot.
//!
//! # Core Concept: Owned Handles over a Transport
//!
//! - Requests: `construct`, `update`, pointer/wheel/pan events, hit tests, `destroy`
//! - Responses: axis scales, hit elements, datalabel data
//! - Calls on a chart that is not live are no-ops returning empty results
//!
//! # Example
//!
//! ```ignore
//! use studio_bridge::{ChartBridge, WorkerTransport, WheelEvent};
//!
//! async fn zoom(bridge: &mut ChartBridge<WorkerTransport>) {
//!     let scales = bridge.wheel(WheelEvent { x: 120.0, y: 40.0, delta_y: -1.0 }).await;
//!     println!("x range: {:?}", scales.get("x"));
//! }
//! ```

mod bridge;
pub mod chart;
mod error;
mod protocol;
mod tokio_impl;
mod transport;
mod types;

pub use bridge::{BridgeState, ChartBridge};
pub use chart::ChartModel;
pub use error::BridgeError;
pub use protocol::{ChartRegistry, ChartRequest, ChartResponse};
pub use tokio_impl::WorkerTransport;
pub use transport::{ChartTransport, InProcessTransport};
pub use types::{
    AxisOptions, CanvasNode, ChartData, ChartId, ChartOptions, ChartType, DataPoint, Dataset,
    ElementAtEvent, PanEvent, Point, PointerEvent, PointerKind, ScaleBounds, Scales, WheelEvent,
    X_AXIS, Y_AXIS,
};
