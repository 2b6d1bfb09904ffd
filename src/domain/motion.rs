//! Motion Steering
//!
//! Derives a steering value from the handset's orientation sensors. With an
//! accelerometer alone the lateral gravity component is averaged over a short
//! window; with a magnetometer as well, a full rotation matrix is built and
//! the pitch angle is used instead.

use std::collections::VecDeque;
use std::f64::consts::FRAC_PI_2;

/// Standard gravity used to normalize lateral acceleration
pub const STANDARD_GRAVITY: f64 = 9.8;
/// Moving-average window for accelerometer-only steering
pub const DEFAULT_ACCEL_WINDOW: usize = 10;

const ROTATION_GRAVITY: f32 = 9.81;
const MIN_GEOMAGNETIC_NORM: f32 = 0.1;

/// Which sensors the handset provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorAvailability {
    pub accelerometer: bool,
    pub magnetometer: bool,
}

/// Steering source, chosen once when sensors are registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteeringSource {
    Manual,
    AccelOnly,
    AccelPlusMag,
}

impl SteeringSource {
    pub fn select(use_motion: bool, sensors: SensorAvailability) -> Self {
        match (use_motion, sensors.accelerometer, sensors.magnetometer) {
            (true, true, true) => Self::AccelPlusMag,
            (true, true, false) => Self::AccelOnly,
            _ => Self::Manual,
        }
    }

    pub fn is_motion(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorSample {
    Accelerometer([f32; 3]),
    MagneticField([f32; 3]),
}

/// One steering update from the motion source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReading {
    /// Tilt normalized to [-1, 1], for the on-screen indicator
    pub normalized: f64,
    /// Steering value in [-100, 100]
    pub steer: i32,
}

impl MotionReading {
    fn from_normalized(value: f64) -> Self {
        let normalized = value.clamp(-1.0, 1.0);
        let steer = ((normalized * 100.0) as i32).clamp(-100, 100);
        Self { normalized, steer }
    }
}

pub struct MotionSteering {
    source: SteeringSource,
    window: usize,
    lateral_buffer: VecDeque<f32>,
    last_accel: Option<[f32; 3]>,
    last_magnetic: Option<[f32; 3]>,
}

impl MotionSteering {
    pub fn new(window: usize) -> Self {
        Self {
            source: SteeringSource::Manual,
            window: window.max(1),
            lateral_buffer: VecDeque::new(),
            last_accel: None,
            last_magnetic: None,
        }
    }

    pub fn source(&self) -> SteeringSource {
        self.source
    }

    /// Start consuming samples from `source`, discarding older readings
    pub fn register(&mut self, source: SteeringSource) {
        self.clear();
        self.source = source;
        tracing::debug!("Motion steering registered as {:?}", source);
    }

    /// Stop consuming samples
    pub fn unregister(&mut self) {
        self.clear();
        self.source = SteeringSource::Manual;
    }

    /// Latest smoothed lateral acceleration, if any samples are buffered
    pub fn smoothed_lateral(&self) -> Option<f64> {
        if self.lateral_buffer.is_empty() {
            return None;
        }
        let sum: f32 = self.lateral_buffer.iter().sum();
        Some(f64::from(sum) / self.lateral_buffer.len() as f64)
    }

    pub fn process(&mut self, sample: SensorSample) -> Option<MotionReading> {
        match (self.source, sample) {
            (SteeringSource::Manual, _) => None,
            (SteeringSource::AccelOnly, SensorSample::Accelerometer(values)) => {
                Some(self.update_lateral(values[1]))
            }
            (SteeringSource::AccelOnly, SensorSample::MagneticField(_)) => None,
            (SteeringSource::AccelPlusMag, SensorSample::Accelerometer(values)) => {
                self.last_accel = Some(values);
                self.update_orientation()
            }
            (SteeringSource::AccelPlusMag, SensorSample::MagneticField(values)) => {
                self.last_magnetic = Some(values);
                self.update_orientation()
            }
        }
    }

    fn update_lateral(&mut self, lateral: f32) -> MotionReading {
        self.lateral_buffer.push_back(lateral);
        while self.lateral_buffer.len() > self.window {
            self.lateral_buffer.pop_front();
        }

        let average = self.smoothed_lateral().unwrap_or_default();
        MotionReading::from_normalized(average / STANDARD_GRAVITY)
    }

    fn update_orientation(&mut self) -> Option<MotionReading> {
        let (gravity, geomagnetic) = (self.last_accel?, self.last_magnetic?);
        let rotation = rotation_matrix(gravity, geomagnetic)?;
        let pitch = orientation(&rotation)[1];

        Some(MotionReading::from_normalized(-f64::from(pitch) / FRAC_PI_2))
    }

    fn clear(&mut self) {
        self.lateral_buffer.clear();
        self.last_accel = None;
        self.last_magnetic = None;
    }
}

/// Row-major rotation matrix from device to world coordinates.
///
/// Returns `None` in free fall or when the field is parallel to gravity.
pub fn rotation_matrix(gravity: [f32; 3], geomagnetic: [f32; 3]) -> Option<[f32; 9]> {
    let [mut ax, mut ay, mut az] = gravity;
    let [ex, ey, ez] = geomagnetic;

    let norm_sq_a = ax * ax + ay * ay + az * az;
    let free_fall_gravity_sq = 0.01 * ROTATION_GRAVITY * ROTATION_GRAVITY;
    if norm_sq_a < free_fall_gravity_sq {
        return None;
    }

    let mut hx = ey * az - ez * ay;
    let mut hy = ez * ax - ex * az;
    let mut hz = ex * ay - ey * ax;
    let norm_h = (hx * hx + hy * hy + hz * hz).sqrt();
    if norm_h < MIN_GEOMAGNETIC_NORM {
        return None;
    }

    let inv_h = 1.0 / norm_h;
    hx *= inv_h;
    hy *= inv_h;
    hz *= inv_h;

    let inv_a = 1.0 / norm_sq_a.sqrt();
    ax *= inv_a;
    ay *= inv_a;
    az *= inv_a;

    let mx = ay * hz - az * hy;
    let my = az * hx - ax * hz;
    let mz = ax * hy - ay * hx;

    Some([hx, hy, hz, mx, my, mz, ax, ay, az])
}

/// Azimuth, pitch and roll in radians
pub fn orientation(r: &[f32; 9]) -> [f32; 3] {
    [r[1].atan2(r[4]), (-r[7]).asin(), (-r[6]).atan2(r[8])]
}
