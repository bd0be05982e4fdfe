//! The "INPUT" layer - Message Normalization
//!
//! Wire messages arrive as loosely-typed JSON values whose shape drifts
//! between schema versions (ROS 1, ROS 2, Foxglove). This module converts
//! them into fully-populated domain values:
//! - Every leaf field is read leniently: a missing field or a field of the
//!   wrong JSON type degrades to its zero-equivalent, independently of its
//!   siblings.
//! - Normalization is pure and never fails.

use nalgebra::{Matrix6, Quaternion, UnitQuaternion, Vector3};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of entries in a flattened row-major 6×6 covariance matrix
pub const COVARIANCE_LEN: usize = 36;

/// Row-major offsets of the X, Y, Z position variances
pub const POSITION_VARIANCE_INDICES: [usize; 3] = [0, 7, 14];

const NANOS_PER_SEC: u64 = 1_000_000_000;

// ============================================================================
// LENIENT FIELD DECODING
// ============================================================================

/// Decode a field, mapping any type mismatch to `None` instead of an error.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Decode a partial wire structure, falling back to the all-default value
/// when the input is not an object at all.
fn decode<T: DeserializeOwned + Default>(value: &Value) -> T {
    T::deserialize(value).unwrap_or_default()
}

// ============================================================================
// WIRE SHAPES (Partial)
// ============================================================================

/// `{sec, nsec}` (ROS 1, Foxglove) or `{sec, nanosec}` (ROS 2)
#[derive(Debug, Clone, Default, Deserialize)]
struct RawTime {
    #[serde(default, deserialize_with = "lenient")]
    sec: Option<i64>,
    #[serde(default, alias = "nanosec", deserialize_with = "lenient")]
    nsec: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawHeader {
    #[serde(default, deserialize_with = "lenient")]
    frame_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    stamp: Option<RawTime>,
    #[serde(default, deserialize_with = "lenient")]
    seq: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawVector3 {
    #[serde(default, deserialize_with = "lenient")]
    x: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    y: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    z: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawQuaternion {
    #[serde(default, deserialize_with = "lenient")]
    x: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    y: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    z: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    w: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPose {
    #[serde(default, deserialize_with = "lenient")]
    position: Option<RawVector3>,
    #[serde(default, deserialize_with = "lenient")]
    orientation: Option<RawQuaternion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPoseWithCovariance {
    #[serde(default, deserialize_with = "lenient")]
    pose: Option<RawPose>,
    #[serde(default, deserialize_with = "lenient")]
    covariance: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPoseStamped {
    #[serde(default, deserialize_with = "lenient")]
    header: Option<RawHeader>,
    #[serde(default, deserialize_with = "lenient")]
    pose: Option<RawPose>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPoseWithCovarianceStamped {
    #[serde(default, deserialize_with = "lenient")]
    header: Option<RawHeader>,
    #[serde(default, deserialize_with = "lenient")]
    pose: Option<RawPoseWithCovariance>,
}

/// `foxglove.PoseInFrame`: flat timestamp and frame id, no header
#[derive(Debug, Clone, Default, Deserialize)]
struct RawPoseInFrame {
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<RawTime>,
    #[serde(default, deserialize_with = "lenient")]
    frame_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pose: Option<RawPose>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawKeyValue {
    #[serde(default, deserialize_with = "lenient")]
    key: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDiagnosticStatus {
    #[serde(default, deserialize_with = "lenient")]
    level: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    hardware_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDiagnosticArray {
    #[serde(default, deserialize_with = "lenient")]
    header: Option<RawHeader>,
    #[serde(default, deserialize_with = "lenient")]
    status: Option<Vec<Value>>,
}

// ============================================================================
// DOMAIN TYPES (Fully Populated)
// ============================================================================

/// Normalized message header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Coordinate frame the payload is expressed in (empty when unknown)
    pub frame_id: String,

    /// Message timestamp in nanoseconds
    pub stamp_ns: u64,

    /// Sequence number (ROS 1 only, zero otherwise)
    pub seq: u32,
}

/// Position and orientation in the header's frame
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Flattened row-major 6×6 covariance `[x, y, z, roll, pitch, yaw]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Covariance(pub [f64; COVARIANCE_LEN]);

impl Covariance {
    /// The all-zero covariance.
    pub fn zeros() -> Self {
        Self([0.0; COVARIANCE_LEN])
    }

    /// Build from an arbitrary-length slice: zero-padded or truncated to 36
    /// entries, non-finite entries replaced by zero.
    pub fn from_slice(values: &[f64]) -> Self {
        let mut data = [0.0; COVARIANCE_LEN];
        for (slot, value) in data.iter_mut().zip(values.iter()) {
            *slot = if value.is_finite() { *value } else { 0.0 };
        }
        Self(data)
    }

    /// View as a 6×6 matrix.
    pub fn matrix(&self) -> Matrix6<f64> {
        Matrix6::from_row_slice(&self.0)
    }

    /// The X, Y, Z position variances (diagonal entries 0, 7, 14).
    pub fn position_variances(&self) -> Vector3<f64> {
        let [x, y, z] = POSITION_VARIANCE_INDICES;
        Vector3::new(self.0[x], self.0[y], self.0[z])
    }
}

impl Default for Covariance {
    fn default() -> Self {
        Self::zeros()
    }
}

/// A timestamped pose, with covariance when the schema carries one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseMessage {
    pub header: Header,
    pub pose: Pose,
    pub covariance: Option<Covariance>,
}

/// Diagnostic level as published on the wire (`ok=0, warn=1, error=2, stale=3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
    Stale,
}

impl DiagnosticLevel {
    /// All levels in ascending severity.
    pub const ALL: [DiagnosticLevel; 4] = [
        DiagnosticLevel::Stale,
        DiagnosticLevel::Ok,
        DiagnosticLevel::Warn,
        DiagnosticLevel::Error,
    ];

    /// Map a wire code to a level. Unknown codes are treated as stale.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => DiagnosticLevel::Ok,
            1 => DiagnosticLevel::Warn,
            2 => DiagnosticLevel::Error,
            _ => DiagnosticLevel::Stale,
        }
    }

    /// The wire code.
    pub fn code(self) -> u8 {
        match self {
            DiagnosticLevel::Ok => 0,
            DiagnosticLevel::Warn => 1,
            DiagnosticLevel::Error => 2,
            DiagnosticLevel::Stale => 3,
        }
    }

    /// Display severity: `stale < ok < warn < error`.
    pub fn severity(self) -> u8 {
        match self {
            DiagnosticLevel::Stale => 0,
            DiagnosticLevel::Ok => 1,
            DiagnosticLevel::Warn => 2,
            DiagnosticLevel::Error => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiagnosticLevel::Ok => "ok",
            DiagnosticLevel::Warn => "warn",
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Stale => "stale",
        }
    }
}

impl PartialOrd for DiagnosticLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiagnosticLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// One entry of a diagnostic array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticStatus {
    pub level: DiagnosticLevel,
    pub name: String,
    pub message: String,
    pub hardware_id: String,
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticArray {
    pub header: Header,
    pub status: Vec<DiagnosticStatus>,
}

// ============================================================================
// NORMALIZERS
// ============================================================================

fn time_to_nanos(time: Option<&RawTime>) -> u64 {
    let Some(time) = time else {
        return 0;
    };
    let sec = time.sec.unwrap_or(0).max(0) as u64;
    let nsec = time.nsec.unwrap_or(0).max(0) as u64;
    sec.saturating_mul(NANOS_PER_SEC).saturating_add(nsec)
}

fn normalize_header(raw: Option<&RawHeader>) -> Header {
    let Some(raw) = raw else {
        return Header::default();
    };
    Header {
        frame_id: raw.frame_id.clone().unwrap_or_default(),
        stamp_ns: time_to_nanos(raw.stamp.as_ref()),
        seq: raw.seq.unwrap_or(0),
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn normalize_position(raw: Option<&RawVector3>) -> Vector3<f64> {
    match raw {
        Some(v) => Vector3::new(finite_or_zero(v.x), finite_or_zero(v.y), finite_or_zero(v.z)),
        None => Vector3::zeros(),
    }
}

fn normalize_orientation(raw: Option<&RawQuaternion>) -> UnitQuaternion<f64> {
    let Some(q) = raw else {
        return UnitQuaternion::identity();
    };
    let quat = Quaternion::new(
        q.w.unwrap_or(1.0),
        q.x.unwrap_or(0.0),
        q.y.unwrap_or(0.0),
        q.z.unwrap_or(0.0),
    );
    let norm = quat.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(quat)
}

fn normalize_pose(raw: Option<&RawPose>) -> Pose {
    let Some(raw) = raw else {
        return Pose::default();
    };
    Pose {
        position: normalize_position(raw.position.as_ref()),
        orientation: normalize_orientation(raw.orientation.as_ref()),
    }
}

fn normalize_covariance(raw: Option<&Vec<Value>>) -> Covariance {
    let values: Vec<f64> = raw
        .map(|entries| entries.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
        .unwrap_or_default();
    Covariance::from_slice(&values)
}

/// Normalize `geometry_msgs/PoseStamped`. Never carries covariance.
pub fn normalize_pose_stamped(value: &Value) -> PoseMessage {
    let raw: RawPoseStamped = decode(value);
    PoseMessage {
        header: normalize_header(raw.header.as_ref()),
        pose: normalize_pose(raw.pose.as_ref()),
        covariance: None,
    }
}

/// Normalize `geometry_msgs/PoseWithCovarianceStamped`.
///
/// Always carries a covariance; an absent matrix becomes all zeros.
pub fn normalize_pose_with_covariance_stamped(value: &Value) -> PoseMessage {
    let raw: RawPoseWithCovarianceStamped = decode(value);
    let with_cov = raw.pose.unwrap_or_default();
    PoseMessage {
        header: normalize_header(raw.header.as_ref()),
        pose: normalize_pose(with_cov.pose.as_ref()),
        covariance: Some(normalize_covariance(with_cov.covariance.as_ref())),
    }
}

/// Normalize `foxglove.PoseInFrame`.
pub fn normalize_pose_in_frame(value: &Value) -> PoseMessage {
    let raw: RawPoseInFrame = decode(value);
    PoseMessage {
        header: Header {
            frame_id: raw.frame_id.unwrap_or_default(),
            stamp_ns: time_to_nanos(raw.timestamp.as_ref()),
            seq: 0,
        },
        pose: normalize_pose(raw.pose.as_ref()),
        covariance: None,
    }
}

fn normalize_status(value: &Value) -> DiagnosticStatus {
    let raw: RawDiagnosticStatus = decode(value);
    let values = raw
        .values
        .unwrap_or_default()
        .iter()
        .map(|entry| {
            let kv: RawKeyValue = decode(entry);
            KeyValue {
                key: kv.key.unwrap_or_default(),
                value: kv.value.unwrap_or_default(),
            }
        })
        .collect();

    DiagnosticStatus {
        level: DiagnosticLevel::from_code(raw.level.unwrap_or(0)),
        name: raw.name.unwrap_or_default(),
        message: raw.message.unwrap_or_default(),
        hardware_id: raw.hardware_id.unwrap_or_default(),
        values,
    }
}

/// Normalize `diagnostic_msgs/DiagnosticArray`.
pub fn normalize_diagnostic_array(value: &Value) -> DiagnosticArray {
    let raw: RawDiagnosticArray = decode(value);
    DiagnosticArray {
        header: normalize_header(raw.header.as_ref()),
        status: raw
            .status
            .unwrap_or_default()
            .iter()
            .map(normalize_status)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_empty_message_normalizes_to_defaults() {
        let msg = normalize_pose_stamped(&json!({}));
        assert_eq!(msg.header, Header::default());
        assert_eq!(msg.pose, Pose::default());
        assert!(msg.covariance.is_none());
    }

    #[test]
    fn test_non_object_input_never_fails() {
        for value in [json!(null), json!(42), json!("pose"), json!([1, 2, 3])] {
            let msg = normalize_pose_with_covariance_stamped(&value);
            assert_eq!(msg.header.frame_id, "");
            assert_eq!(msg.covariance, Some(Covariance::zeros()));
        }
    }

    #[test]
    fn test_ros1_header_and_pose() {
        let msg = normalize_pose_stamped(&json!({
            "header": { "frame_id": "map", "stamp": { "sec": 2, "nsec": 500 }, "seq": 7 },
            "pose": {
                "position": { "x": 1.0, "y": 2.0, "z": 3.0 },
                "orientation": { "x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0 }
            }
        }));

        assert_eq!(msg.header.frame_id, "map");
        assert_eq!(msg.header.stamp_ns, 2_000_000_500);
        assert_eq!(msg.header.seq, 7);
        assert_eq!(msg.pose.position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_ros2_nanosec_alias() {
        let msg = normalize_pose_stamped(&json!({
            "header": { "frame_id": "odom", "stamp": { "sec": 1, "nanosec": 25 } }
        }));
        assert_eq!(msg.header.stamp_ns, 1_000_000_025);
    }

    #[test]
    fn test_wrong_typed_field_does_not_poison_siblings() {
        let msg = normalize_pose_stamped(&json!({
            "header": { "frame_id": 12, "stamp": { "sec": 3 } },
            "pose": { "position": { "x": "oops", "y": 4.0 } }
        }));

        assert_eq!(msg.header.frame_id, "");
        assert_eq!(msg.header.stamp_ns, 3 * NANOS_PER_SEC);
        assert_eq!(msg.pose.position, Vector3::new(0.0, 4.0, 0.0));
    }

    #[test]
    fn test_negative_stamp_clamps_to_zero() {
        let msg = normalize_pose_stamped(&json!({
            "header": { "stamp": { "sec": -5, "nsec": -1 } }
        }));
        assert_eq!(msg.header.stamp_ns, 0);
    }

    #[test]
    fn test_zero_quaternion_becomes_identity() {
        let msg = normalize_pose_stamped(&json!({
            "pose": { "orientation": { "x": 0.0, "y": 0.0, "z": 0.0, "w": 0.0 } }
        }));
        assert_eq!(msg.pose.orientation, UnitQuaternion::identity());
    }

    #[test]
    fn test_quaternion_is_normalized() {
        let msg = normalize_pose_stamped(&json!({
            "pose": { "orientation": { "x": 0.0, "y": 0.0, "z": 2.0, "w": 2.0 } }
        }));
        let q = msg.pose.orientation.quaternion();
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.k, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_padding_and_truncation() {
        let short = normalize_pose_with_covariance_stamped(&json!({
            "pose": { "covariance": [0.04, 1.0, "x"] }
        }));
        let cov = short.covariance.unwrap();
        assert_eq!(cov.0[0], 0.04);
        assert_eq!(cov.0[1], 1.0);
        assert_eq!(cov.0[2], 0.0);
        assert_eq!(cov.0[35], 0.0);

        let long: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let long = normalize_pose_with_covariance_stamped(&json!({
            "pose": { "covariance": long }
        }));
        assert_eq!(long.covariance.unwrap().0[35], 35.0);
    }

    #[test]
    fn test_position_variances_use_diagonal_offsets() {
        let mut values = [0.0; COVARIANCE_LEN];
        values[0] = 0.04;
        values[7] = 0.09;
        values[14] = 0.01;
        values[1] = 99.0;
        let cov = Covariance(values);

        assert_eq!(cov.position_variances(), Vector3::new(0.04, 0.09, 0.01));
        assert_eq!(cov.matrix()[(1, 1)], 0.09);
        assert_eq!(cov.matrix()[(0, 1)], 99.0);
    }

    #[test]
    fn test_pose_in_frame() {
        let msg = normalize_pose_in_frame(&json!({
            "timestamp": { "sec": 10, "nsec": 1 },
            "frame_id": "base_link",
            "pose": { "position": { "x": 5.0 } }
        }));
        assert_eq!(msg.header.frame_id, "base_link");
        assert_eq!(msg.header.stamp_ns, 10_000_000_001);
        assert_eq!(msg.pose.position.x, 5.0);
        assert!(msg.covariance.is_none());
    }

    #[test]
    fn test_diagnostic_array() {
        let array = normalize_diagnostic_array(&json!({
            "header": { "stamp": { "sec": 1 } },
            "status": [
                { "level": 2, "name": "motor", "message": "overheat", "hardware_id": "m1",
                  "values": [{ "key": "temp", "value": "90" }, 5] },
                "garbage",
                { "level": 9, "name": "gps" }
            ]
        }));

        assert_eq!(array.status.len(), 3);
        assert_eq!(array.status[0].level, DiagnosticLevel::Error);
        assert_eq!(array.status[0].values[0].key, "temp");
        assert_eq!(array.status[0].values[1], KeyValue::default());
        assert_eq!(array.status[1].level, DiagnosticLevel::Ok);
        assert_eq!(array.status[2].level, DiagnosticLevel::Stale);
    }

    #[test]
    fn test_level_severity_order() {
        assert!(DiagnosticLevel::Stale < DiagnosticLevel::Ok);
        assert!(DiagnosticLevel::Ok < DiagnosticLevel::Warn);
        assert!(DiagnosticLevel::Warn < DiagnosticLevel::Error);
        assert_eq!(DiagnosticLevel::Error.code(), 2);
    }
}
