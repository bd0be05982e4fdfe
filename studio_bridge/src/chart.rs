//! Worker-side chart instance.
//!
//! Computes axis scales from the data and options, and applies injected
//! interaction events (wheel zoom, drag pan) to the horizontal view range.
//! Axis orientation follows the id: ids starting with `x` are horizontal.

use crate::types::{
    CanvasNode, ChartData, ChartOptions, ChartType, DataPoint, Dataset, ElementAtEvent, PanEvent,
    Point, PointerEvent, PointerKind, ScaleBounds, Scales, WheelEvent, X_AXIS, Y_AXIS,
};
use std::collections::{BTreeMap, BTreeSet};

/// Outer padding of the chart area, in pixels
pub const PADDING: f64 = 8.0;

/// Width reserved for vertical axes
pub const Y_AXIS_WIDTH: f64 = 40.0;

/// Height reserved for horizontal axes
pub const X_AXIS_HEIGHT: f64 = 24.0;

/// Max pointer distance for an element to count as hit
pub const HIT_RADIUS: f64 = 8.0;

const ZOOM_IN: f64 = 0.9;
const ZOOM_OUT: f64 = 1.1;
const MIN_SPAN: f64 = 1e-9;

const LABEL_OFFSET: f64 = 12.0;
const LABEL_CHAR_WIDTH: f64 = 6.0;
const LABEL_HEIGHT: f64 = 14.0;

fn is_horizontal(axis: &str) -> bool {
    axis.starts_with('x')
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChartArea {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl ChartArea {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// A live chart owned by the worker
#[derive(Debug, Clone)]
pub struct ChartModel {
    chart_type: ChartType,
    data: ChartData,
    options: ChartOptions,
    width: f64,
    height: f64,
    pixel_ratio: f64,

    /// Horizontal view set by zoom/pan, per axis
    x_view: BTreeMap<String, (f64, f64)>,

    /// Last pointer position while dragging
    drag: Option<Point>,
}

impl ChartModel {
    pub fn new(
        node: CanvasNode,
        chart_type: ChartType,
        data: ChartData,
        options: ChartOptions,
        pixel_ratio: f64,
    ) -> Self {
        Self {
            chart_type,
            data,
            options,
            width: node.width,
            height: node.height,
            pixel_ratio: if pixel_ratio.is_finite() && pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
            x_view: BTreeMap::new(),
            drag: None,
        }
    }

    /// Replace data, options and size. The zoomed view is kept.
    pub fn update(&mut self, data: ChartData, options: ChartOptions, width: f64, height: f64) -> Scales {
        self.data = data;
        self.options = options;
        self.width = width;
        self.height = height;
        self.scales()
    }

    pub fn chart_type(&self) -> ChartType {
        self.chart_type
    }

    /// Backing store size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        let scale = |v: f64| (v.max(0.0) * self.pixel_ratio).round() as u32;
        (scale(self.width), scale(self.height))
    }

    fn area(&self) -> ChartArea {
        ChartArea {
            left: PADDING + Y_AXIS_WIDTH,
            right: self.width - PADDING,
            top: PADDING,
            bottom: self.height - PADDING - X_AXIS_HEIGHT,
        }
    }

    fn axes(&self) -> BTreeSet<String> {
        let mut axes: BTreeSet<String> = [X_AXIS.to_string(), Y_AXIS.to_string()].into();
        for dataset in &self.data.datasets {
            axes.insert(dataset.x_axis_id.clone());
            axes.insert(dataset.y_axis_id.clone());
        }
        axes.extend(self.options.scales.keys().cloned());
        axes
    }

    fn data_range(&self, axis: &str) -> Option<(f64, f64)> {
        let horizontal = is_horizontal(axis);
        let mut range: Option<(f64, f64)> = None;

        let values = self.data.datasets.iter().flat_map(|dataset| {
            let on_axis = if horizontal {
                dataset.x_axis_id == axis
            } else {
                dataset.y_axis_id == axis
            };
            dataset
                .data
                .iter()
                .filter(move |_| on_axis)
                .map(move |p| if horizontal { p.x } else { p.y })
        });

        for value in values.filter(|v| v.is_finite()) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
                None => (value, value),
            });
        }

        // Bars grow from zero
        if self.chart_type == ChartType::Bar && !horizontal {
            range = range.map(|(lo, hi)| (lo.min(0.0), hi.max(0.0)));
        }
        range
    }

    /// Value range of `axis`: zoomed view, else options limits over data.
    fn axis_range(&self, axis: &str) -> Option<(f64, f64)> {
        if let Some(view) = self.x_view.get(axis) {
            return Some(*view);
        }

        let limits = self.options.scales.get(axis).copied().unwrap_or_default();
        let data = self.data_range(axis);
        let lo = limits.min.or(data.map(|(lo, _)| lo));
        let hi = limits.max.or(data.map(|(_, hi)| hi));

        match (lo, hi) {
            (Some(lo), Some(hi)) if lo == hi => Some((lo - 1.0, hi + 1.0)),
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    /// Current scale snapshot for every known axis.
    pub fn scales(&self) -> Scales {
        let area = self.area();
        self.axes()
            .into_iter()
            .map(|axis| {
                let range = self.axis_range(&axis);
                let (left, right) = if is_horizontal(&axis) {
                    (area.left, area.right)
                } else {
                    (PADDING, area.left)
                };
                let bounds = ScaleBounds {
                    left: Some(left),
                    right: Some(right),
                    min: range.map(|(lo, _)| lo),
                    max: range.map(|(_, hi)| hi),
                };
                (axis, bounds)
            })
            .collect()
    }

    fn to_pixel(&self, dataset: &Dataset, point: &DataPoint) -> Option<Point> {
        let area = self.area();
        if area.is_degenerate() || !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        let (x_lo, x_hi) = self.axis_range(&dataset.x_axis_id)?;
        let (y_lo, y_hi) = self.axis_range(&dataset.y_axis_id)?;

        let px = area.left + (point.x - x_lo) / (x_hi - x_lo) * area.width();
        let py = area.bottom - (point.y - y_lo) / (y_hi - y_lo) * area.height();
        Some(Point::new(px, py))
    }

    fn horizontal_axes(&self) -> Vec<String> {
        self.axes().into_iter().filter(|a| is_horizontal(a)).collect()
    }

    /// Zoom every horizontal axis by `factor`, keeping the value under
    /// pixel `x` fixed.
    fn zoom_at(&mut self, x: f64, factor: f64) {
        let area = self.area();
        if factor <= 0.0 || area.is_degenerate() {
            return;
        }
        let ratio = ((x - area.left) / area.width()).clamp(0.0, 1.0);

        for axis in self.horizontal_axes() {
            let Some((lo, hi)) = self.axis_range(&axis) else {
                continue;
            };
            let span = hi - lo;
            let center = lo + span * ratio;
            let new_span = (span * factor).max(MIN_SPAN);
            let new_lo = center - new_span * ratio;
            self.x_view.insert(axis, (new_lo, new_lo + new_span));
        }
    }

    /// Shift every horizontal axis by `dx` pixels. Dragging right reveals
    /// smaller values.
    fn pan_pixels(&mut self, dx: f64) {
        let area = self.area();
        if area.is_degenerate() || !dx.is_finite() {
            return;
        }
        for axis in self.horizontal_axes() {
            let Some((lo, hi)) = self.axis_range(&axis) else {
                continue;
            };
            let shift = dx * (hi - lo) / area.width();
            self.x_view.insert(axis, (lo - shift, hi - shift));
        }
    }

    pub fn wheel(&mut self, event: &WheelEvent) -> Scales {
        let factor = if event.delta_y < 0.0 { ZOOM_IN } else { ZOOM_OUT };
        self.zoom_at(event.x, factor);
        self.scales()
    }

    pub fn pan(&mut self, event: &PanEvent) -> Scales {
        self.pan_pixels(event.delta_x);
        self.scales()
    }

    /// Down starts a drag, Move pans while dragging, Up ends it.
    pub fn pointer(&mut self, event: &PointerEvent) -> Scales {
        let point = event.point();
        match event.kind {
            PointerKind::Down => self.drag = Some(point),
            PointerKind::Move => {
                if let Some(last) = self.drag {
                    self.pan_pixels(point.x - last.x);
                    self.drag = Some(point);
                }
            }
            PointerKind::Up => self.drag = None,
        }
        self.scales()
    }

    /// Drop any zoom/pan view.
    pub fn reset_zoom(&mut self) -> Scales {
        self.x_view.clear();
        self.scales()
    }

    /// Elements within `HIT_RADIUS` of `point`, nearest first.
    pub fn elements_at(&self, point: &Point) -> Vec<ElementAtEvent> {
        let mut hits: Vec<(f64, ElementAtEvent)> = Vec::new();
        for dataset in &self.data.datasets {
            for data in &dataset.data {
                let Some(view_position) = self.to_pixel(dataset, data) else {
                    continue;
                };
                let distance = view_position.distance(point);
                if distance <= HIT_RADIUS {
                    hits.push((
                        distance,
                        ElementAtEvent {
                            view_position,
                            data: data.clone(),
                        },
                    ));
                }
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, element)| element).collect()
    }

    /// Data point whose drawn label contains the event position. Labels are
    /// drawn above their point; the last drawn wins.
    pub fn datalabel_at(&self, event: &PointerEvent) -> Option<DataPoint> {
        if !self.options.datalabels {
            return None;
        }
        let target = event.point();

        self.data
            .datasets
            .iter()
            .flat_map(|dataset| dataset.data.iter().map(move |data| (dataset, data)))
            .filter_map(|(dataset, data)| {
                let label = data.label.as_ref()?;
                let anchor = self.to_pixel(dataset, data)?;
                let half_width = label.chars().count() as f64 * LABEL_CHAR_WIDTH / 2.0 + 2.0;
                let center_y = anchor.y - LABEL_OFFSET;
                let inside = (target.x - anchor.x).abs() <= half_width
                    && (target.y - center_y).abs() <= LABEL_HEIGHT / 2.0;
                inside.then(|| data.clone())
            })
            .last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisOptions;
    use approx::assert_relative_eq;

    fn line_chart(points: Vec<DataPoint>) -> ChartModel {
        ChartModel::new(
            CanvasNode { width: 448.0, height: 240.0 },
            ChartType::Line,
            ChartData {
                datasets: vec![Dataset::new("speed", points)],
            },
            ChartOptions::default(),
            2.0,
        )
    }

    fn x_range(scales: &Scales) -> (f64, f64) {
        let x = scales[X_AXIS];
        (x.min.unwrap(), x.max.unwrap())
    }

    #[test]
    fn test_scales_follow_data() {
        let chart = line_chart(vec![DataPoint::new(0.0, 1.0), DataPoint::new(10.0, 5.0)]);
        let scales = chart.scales();

        assert_eq!(x_range(&scales), (0.0, 10.0));
        assert_eq!(scales[Y_AXIS].min, Some(1.0));
        assert_eq!(scales[Y_AXIS].max, Some(5.0));
        assert_eq!(scales[X_AXIS].left, Some(48.0));
        assert_eq!(scales[X_AXIS].right, Some(440.0));
        assert_eq!(chart.device_size(), (896, 480));
    }

    #[test]
    fn test_empty_data_has_undefined_ranges() {
        let chart = line_chart(vec![]);
        let scales = chart.scales();
        assert_eq!(scales.len(), 2);
        assert!(scales[X_AXIS].min.is_none());
        assert!(scales[Y_AXIS].max.is_none());
    }

    #[test]
    fn test_options_override_data_limits() {
        let mut chart = line_chart(vec![DataPoint::new(0.0, 1.0), DataPoint::new(10.0, 5.0)]);
        let mut options = ChartOptions::default();
        options.scales.insert(Y_AXIS.to_string(), AxisOptions { min: Some(-1.0), max: None });
        let data = chart.data.clone();

        let scales = chart.update(data, options, 448.0, 240.0);
        assert_eq!(scales[Y_AXIS].min, Some(-1.0));
        assert_eq!(scales[Y_AXIS].max, Some(5.0));
    }

    #[test]
    fn test_wheel_zoom_narrows_around_cursor() {
        let mut chart = line_chart(vec![DataPoint::new(0.0, 0.0), DataPoint::new(100.0, 1.0)]);
        // Cursor at the middle of the chart area (48..440)
        let scales = chart.wheel(&WheelEvent { x: 244.0, y: 100.0, delta_y: -1.0 });
        let (lo, hi) = x_range(&scales);

        assert_relative_eq!(hi - lo, 90.0, epsilon = 1e-9);
        assert_relative_eq!((lo + hi) / 2.0, 50.0, epsilon = 1e-9);

        let scales = chart.wheel(&WheelEvent { x: 244.0, y: 100.0, delta_y: 1.0 });
        let (lo, hi) = x_range(&scales);
        assert_relative_eq!(hi - lo, 99.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pan_shifts_range() {
        let mut chart = line_chart(vec![DataPoint::new(0.0, 0.0), DataPoint::new(392.0, 1.0)]);
        // Area is 392px wide, so one pixel is one unit
        let scales = chart.pan(&PanEvent { delta_x: 10.0, delta_y: 0.0 });
        let (lo, hi) = x_range(&scales);
        assert_relative_eq!(lo, -10.0, epsilon = 1e-9);
        assert_relative_eq!(hi, 382.0, epsilon = 1e-9);

        let scales = chart.reset_zoom();
        assert_eq!(x_range(&scales), (0.0, 392.0));
    }

    #[test]
    fn test_pointer_drag_pans() {
        let mut chart = line_chart(vec![DataPoint::new(0.0, 0.0), DataPoint::new(392.0, 1.0)]);
        chart.pointer(&PointerEvent::new(PointerKind::Move, 100.0, 50.0));
        assert_eq!(x_range(&chart.scales()), (0.0, 392.0));

        chart.pointer(&PointerEvent::new(PointerKind::Down, 100.0, 50.0));
        chart.pointer(&PointerEvent::new(PointerKind::Move, 80.0, 50.0));
        let scales = chart.pointer(&PointerEvent::new(PointerKind::Up, 80.0, 50.0));
        let (lo, _) = x_range(&scales);
        assert_relative_eq!(lo, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elements_at_event() {
        let chart = line_chart(vec![DataPoint::new(0.0, 0.0), DataPoint::new(10.0, 10.0)]);
        // (0, 0) sits at the bottom-left corner of the area
        let hits = chart.elements_at(&Point::new(50.0, 206.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data, DataPoint::new(0.0, 0.0));
        assert_eq!(hits[0].view_position, Point::new(48.0, 208.0));

        assert!(chart.elements_at(&Point::new(200.0, 100.0)).is_empty());
    }

    #[test]
    fn test_datalabel_hit() {
        let mut chart = line_chart(vec![
            DataPoint::labeled(0.0, 0.0, "start"),
            DataPoint::new(10.0, 10.0),
        ]);
        let event = PointerEvent::new(PointerKind::Move, 50.0, 196.0);
        assert!(chart.datalabel_at(&event).is_none());

        chart.options.datalabels = true;
        let hit = chart.datalabel_at(&event).unwrap();
        assert_eq!(hit.label.as_deref(), Some("start"));
        assert!(chart
            .datalabel_at(&PointerEvent::new(PointerKind::Move, 50.0, 150.0))
            .is_none());
    }

    #[test]
    fn test_bar_chart_includes_zero() {
        let chart = ChartModel::new(
            CanvasNode { width: 300.0, height: 200.0 },
            ChartType::Bar,
            ChartData {
                datasets: vec![Dataset::new("a", vec![DataPoint::new(1.0, 3.0), DataPoint::new(2.0, 7.0)])],
            },
            ChartOptions::default(),
            1.0,
        );
        assert_eq!(chart.scales()[Y_AXIS].min, Some(0.0));
    }

    #[test]
    fn test_single_value_range_is_widened() {
        let chart = line_chart(vec![DataPoint::new(5.0, 5.0)]);
        assert_eq!(x_range(&chart.scales()), (4.0, 6.0));
    }
}
