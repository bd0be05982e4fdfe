//! Seeded message source.
//!
//! Simulated robots move with a constant-velocity model and publish their
//! pose (with noise) on one topic each, in the wire shape of that topic's
//! datatype. The source can also publish diagnostics and corrupt messages
//! to exercise the normalizer.

use nalgebra::{UnitQuaternion, Vector3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use studio_core::registry::{
    POSE_IN_FRAME_DATATYPES, POSE_STAMPED_DATATYPES, POSE_WITH_COVARIANCE_STAMPED_DATATYPES,
};
use studio_core::{MessageEvent, Topic};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Frames robots publish in
pub const FRAMES: [&str; 3] = ["map", "odom", "base_link"];

/// Rotational variance written to the lower half of the diagonal
const ROTATION_VARIANCE: f64 = 0.01;

/// A simulated robot publishing on one topic.
#[derive(Debug, Clone)]
pub struct SimRobot {
    pub id: u64,
    pub topic: String,
    pub datatype: String,
    pub frame_id: String,

    /// True position [x, y, z] in meters
    pub position: Vector3<f64>,

    /// Velocity in m/s
    pub velocity: Vector3<f64>,

    pub yaw: f64,
    pub yaw_rate: f64,

    /// Position variance [x, y, z] published in the covariance diagonal
    pub variance: Vector3<f64>,

    pub seq: u32,
}

impl SimRobot {
    pub fn has_covariance(&self) -> bool {
        self.datatype.ends_with("PoseWithCovarianceStamped")
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, 0.0, self.yaw)
    }

    /// Row-major 6×6 covariance with `variance` on the position diagonal.
    pub fn covariance(&self) -> [f64; 36] {
        let mut cov = [0.0; 36];
        cov[0] = self.variance.x;
        cov[7] = self.variance.y;
        cov[14] = self.variance.z;
        cov[21] = ROTATION_VARIANCE;
        cov[28] = ROTATION_VARIANCE;
        cov[35] = ROTATION_VARIANCE;
        cov
    }
}

/// What a published pose message should normalize to.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPose {
    pub frame_id: String,
    pub stamp_ns: u64,
    pub position: Vector3<f64>,
    pub covariance: Option<[f64; 36]>,
}

/// The message source - owns the robots and generates their messages.
pub struct MessageSource {
    rng: ChaCha8Rng,
    robots: Vec<SimRobot>,
    next_id: u64,

    /// Position noise standard deviation (meters)
    position_noise_std: f64,

    /// Probability that a robot switches frame on a given message
    frame_switch_prob: f64,
}

impl MessageSource {
    /// Creates a new source with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            robots: Vec::new(),
            next_id: 0,
            position_noise_std: 0.05,
            frame_switch_prob: 0.0,
        }
    }

    /// Creates a source with `count` robots cycling through every supported
    /// pose datatype.
    pub fn with_robots(seed: u64, count: usize) -> Self {
        let datatypes: Vec<&str> = POSE_STAMPED_DATATYPES
            .iter()
            .chain(POSE_WITH_COVARIANCE_STAMPED_DATATYPES)
            .chain(POSE_IN_FRAME_DATATYPES)
            .copied()
            .collect();

        let mut source = Self::new(seed);
        for i in 0..count {
            let datatype = datatypes[i % datatypes.len()];
            source.spawn_robot(&format!("/robot_{}/pose", i), datatype);
        }
        source
    }

    pub fn set_position_noise(&mut self, std_dev: f64) {
        self.position_noise_std = std_dev.max(0.0);
    }

    pub fn set_frame_switch_prob(&mut self, prob: f64) {
        self.frame_switch_prob = prob.clamp(0.0, 1.0);
    }

    /// Spawns a robot with a random start state and returns its ID.
    pub fn spawn_robot(&mut self, topic: &str, datatype: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let robot = SimRobot {
            id,
            topic: topic.to_string(),
            datatype: datatype.to_string(),
            frame_id: FRAMES[(id as usize) % FRAMES.len()].to_string(),
            position: Vector3::new(
                self.rng.gen_range(-50.0..50.0),
                self.rng.gen_range(-50.0..50.0),
                0.0,
            ),
            velocity: Vector3::new(self.rng.gen_range(-2.0..2.0), self.rng.gen_range(-2.0..2.0), 0.0),
            yaw: self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
            yaw_rate: self.rng.gen_range(-0.5..0.5),
            variance: Vector3::new(
                self.rng.gen_range(0.001..1.0),
                self.rng.gen_range(0.001..1.0),
                self.rng.gen_range(0.001..0.1),
            ),
            seq: 0,
        };
        self.robots.push(robot);
        id
    }

    /// Switch robot `index` to another datatype. Returns its topic.
    pub fn retype(&mut self, index: usize, datatype: &str) -> Option<Topic> {
        let robot = self.robots.get_mut(index)?;
        robot.datatype = datatype.to_string();
        Some(Topic::new(robot.topic.clone(), robot.datatype.clone()))
    }

    pub fn robots(&self) -> &[SimRobot] {
        &self.robots
    }

    pub fn robot(&self, topic: &str) -> Option<&SimRobot> {
        self.robots.iter().find(|r| r.topic == topic)
    }

    /// Every robot's topic.
    pub fn topics(&self) -> Vec<Topic> {
        self.robots
            .iter()
            .map(|r| Topic::new(r.topic.clone(), r.datatype.clone()))
            .collect()
    }

    /// Advances every robot by `dt` seconds. Variances take a bounded random
    /// walk so covariance spheres keep changing.
    pub fn step(&mut self, dt: f64) {
        for robot in &mut self.robots {
            robot.position += robot.velocity * dt;
            robot.yaw += robot.yaw_rate * dt;
            for v in robot.variance.iter_mut() {
                let factor: f64 = self.rng.gen_range(0.9..1.1);
                *v = (*v * factor).clamp(1e-4, 4.0);
            }
        }
    }

    /// Publishes the pose of robot `index`.
    pub fn publish(&mut self, index: usize, stamp_ns: u64) -> Option<(MessageEvent, PublishedPose)> {
        let noise = Normal::new(0.0, self.position_noise_std).ok();
        let switch = self.rng.gen_bool(self.frame_switch_prob);
        let new_frame = FRAMES.choose(&mut self.rng).copied();

        let mut sample = || match &noise {
            Some(normal) => normal.sample(&mut self.rng),
            None => 0.0,
        };
        let measured = Vector3::new(sample(), sample(), sample());

        let robot = self.robots.get_mut(index)?;
        if switch {
            if let Some(frame) = new_frame {
                robot.frame_id = frame.to_string();
            }
        }
        robot.seq = robot.seq.wrapping_add(1);
        let position = robot.position + measured;

        let message = encode_pose(robot, position, stamp_ns);
        let published = PublishedPose {
            frame_id: robot.frame_id.clone(),
            stamp_ns,
            position,
            covariance: robot.has_covariance().then(|| robot.covariance()),
        };
        let event = MessageEvent {
            topic: robot.topic.clone(),
            receive_time_ns: stamp_ns,
            message,
        };
        Some((event, published))
    }

    /// Publishes every robot's pose.
    pub fn publish_all(&mut self, stamp_ns: u64) -> Vec<(MessageEvent, PublishedPose)> {
        (0..self.robots.len())
            .filter_map(|i| self.publish(i, stamp_ns))
            .collect()
    }

    /// A `diagnostic_msgs/DiagnosticArray` with `count` random statuses drawn
    /// from `hardware` ids. Levels include out-of-range codes.
    pub fn diagnostic_array(&mut self, stamp_ns: u64, hardware: &[&str], count: usize) -> Value {
        let status: Vec<Value> = (0..count)
            .map(|_| {
                let hardware_id = hardware.choose(&mut self.rng).copied().unwrap_or("");
                let level: i64 = self.rng.gen_range(0..5);
                let name = format!("check_{}", self.rng.gen_range(0..6));
                json!({
                    "level": level,
                    "name": name,
                    "message": format!("level {}", level),
                    "hardware_id": hardware_id,
                    "values": [{ "key": "rate", "value": format!("{:.1}", self.rng.gen_range(0.0..100.0)) }]
                })
            })
            .collect();

        json!({
            "header": { "stamp": split_stamp(stamp_ns, false), "frame_id": "" },
            "status": status
        })
    }

    /// Damages a message: drops or retypes fields, or replaces it outright.
    pub fn corrupt(&mut self, value: Value) -> Value {
        let mut value = value;
        match self.rng.gen_range(0..6) {
            0 => {
                return [json!(null), json!(42), json!("pose"), json!([1, 2])]
                    .choose(&mut self.rng)
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            1 => {
                if let Some(obj) = value.as_object_mut() {
                    let keys: Vec<String> = obj.keys().cloned().collect();
                    if let Some(key) = keys.choose(&mut self.rng) {
                        obj.remove(key);
                    }
                }
            }
            2 => {
                if let Some(header) = value.get_mut("header") {
                    *header = json!("not a header");
                }
            }
            3 => {
                for pointer in ["/pose/position/x", "/pose/pose/position/x"] {
                    if let Some(x) = value.pointer_mut(pointer) {
                        *x = json!("NaN");
                    }
                }
            }
            4 => {
                if let Some(cov) = value.pointer_mut("/pose/covariance") {
                    *cov = json!([0.5, "bad", null]);
                }
            }
            _ => {
                for pointer in ["/pose/orientation", "/pose/pose/orientation"] {
                    if let Some(q) = value.pointer_mut(pointer) {
                        *q = json!({ "x": 0.0, "y": 0.0, "z": 0.0, "w": 0.0 });
                    }
                }
            }
        }
        value
    }

    /// Access to the RNG for scenario-level randomness.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

fn split_stamp(stamp_ns: u64, ros2: bool) -> Value {
    let sec = stamp_ns / NANOS_PER_SEC;
    let nsec = stamp_ns % NANOS_PER_SEC;
    if ros2 {
        json!({ "sec": sec, "nanosec": nsec })
    } else {
        json!({ "sec": sec, "nsec": nsec })
    }
}

fn encode_pose(robot: &SimRobot, position: Vector3<f64>, stamp_ns: u64) -> Value {
    let q = robot.orientation();
    let pose = json!({
        "position": { "x": position.x, "y": position.y, "z": position.z },
        "orientation": { "x": q.i, "y": q.j, "z": q.k, "w": q.w }
    });
    let ros2 = robot.datatype.contains("/msg/");

    if robot.datatype.starts_with("foxglove") {
        return json!({
            "timestamp": split_stamp(stamp_ns, false),
            "frame_id": robot.frame_id,
            "pose": pose
        });
    }

    let mut header = json!({
        "stamp": split_stamp(stamp_ns, ros2),
        "frame_id": robot.frame_id
    });
    if !ros2 {
        header["seq"] = json!(robot.seq);
    }

    if robot.has_covariance() {
        json!({
            "header": header,
            "pose": { "pose": pose, "covariance": robot.covariance().to_vec() }
        })
    } else {
        json!({ "header": header, "pose": pose })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::DatatypeRegistry;

    #[test]
    fn test_source_is_deterministic() {
        let mut a = MessageSource::with_robots(42, 4);
        let mut b = MessageSource::with_robots(42, 4);
        a.step(0.1);
        b.step(0.1);
        assert_eq!(a.publish_all(100), b.publish_all(100));
    }

    #[test]
    fn test_messages_normalize_to_published_values() {
        let registry = DatatypeRegistry::with_defaults();
        let mut source = MessageSource::with_robots(7, 9);
        source.set_position_noise(0.0);

        for (event, published) in source.publish_all(1_500_000_000) {
            let datatype = &source.robot(&event.topic).unwrap().datatype;
            let schema = registry.resolve(datatype).unwrap();
            let msg = schema.normalize(&event.message);

            assert_eq!(msg.header.frame_id, published.frame_id);
            assert_eq!(msg.header.stamp_ns, 1_500_000_000);
            assert_eq!(msg.pose.position, published.position);
            assert_eq!(msg.covariance.map(|c| c.0), published.covariance);
        }
    }

    #[test]
    fn test_corrupted_messages_still_normalize() {
        let registry = DatatypeRegistry::with_defaults();
        let mut source = MessageSource::with_robots(3, 9);
        for _ in 0..50 {
            for (event, _) in source.publish_all(0) {
                let datatype = source.robot(&event.topic).unwrap().datatype.clone();
                let broken = source.corrupt(event.message);
                let msg = registry.resolve(&datatype).unwrap().normalize(&broken);
                assert!(msg.pose.position.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_diagnostic_array_shape() {
        let mut source = MessageSource::new(1);
        let value = source.diagnostic_array(5, &["imu", "lidar"], 3);
        assert_eq!(value["status"].as_array().unwrap().len(), 3);
    }
}
