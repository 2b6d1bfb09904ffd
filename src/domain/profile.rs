//! Per-device calibration profile.

use serde::{Deserialize, Serialize};

/// Default steering gain
pub const SERVO_SWING_DEFAULT: f64 = 1.0;
/// Default servo trim
pub const SERVO_TRIM_DEFAULT: i32 = 0;
/// Largest trim the settings screen can dial in, in either direction
pub const SERVO_TRIM_RANGE: i32 = 30;

/// Identity of a discovered device
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Calibration and preferences for one device.
///
/// Only the calibration fields are persisted; the identity is re-attached
/// from the discovered device when a profile is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(skip)]
    pub identity: DeviceIdentity,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_use_motion: bool,
    #[serde(default)]
    pub is_motor_flip: bool,
    #[serde(default)]
    pub is_servo_flip: bool,
    #[serde(default = "default_swing")]
    pub servo_swing: f64,
    #[serde(default)]
    pub servo_trim: i32,
    #[serde(default)]
    pub sub_servo_trim: i32,
}

fn default_swing() -> f64 {
    SERVO_SWING_DEFAULT
}
fn default_true() -> bool {
    true
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            display_name: String::new(),
            is_use_motion: true,
            is_motor_flip: false,
            is_servo_flip: false,
            servo_swing: SERVO_SWING_DEFAULT,
            servo_trim: SERVO_TRIM_DEFAULT,
            sub_servo_trim: SERVO_TRIM_DEFAULT,
        }
    }
}

impl DeviceProfile {
    /// Fresh profile for a device with no stored record
    pub fn for_device(identity: DeviceIdentity) -> Self {
        Self {
            display_name: identity.name.clone(),
            identity,
            ..Default::default()
        }
    }

    /// Steering offset for a normalized steering value in [-100, 100]
    pub fn steer_offset(&self, value: i32) -> i32 {
        (f64::from(value) * self.servo_swing) as i32
    }

    /// Swing gain as a seek bar position (0.5 -> 0, 1.0 -> 50)
    pub fn servo_swing_seek_value(&self) -> i32 {
        (self.servo_swing * 100.0) as i32 - 50
    }

    pub fn set_servo_swing_seek_value(&mut self, value: i32) {
        self.servo_swing = f64::from(value + 50) / 100.0;
    }

    /// Servo trim as a seek bar position centered on 30
    pub fn servo_trim_seek_value(&self) -> i32 {
        self.servo_trim + SERVO_TRIM_RANGE
    }

    pub fn set_servo_trim_seek_value(&mut self, value: i32) {
        self.servo_trim = (value - SERVO_TRIM_RANGE).clamp(-SERVO_TRIM_RANGE, SERVO_TRIM_RANGE);
    }

    pub fn sub_servo_trim_seek_value(&self) -> i32 {
        self.sub_servo_trim + SERVO_TRIM_RANGE
    }

    pub fn set_sub_servo_trim_seek_value(&mut self, value: i32) {
        self.sub_servo_trim =
            (value - SERVO_TRIM_RANGE).clamp(-SERVO_TRIM_RANGE, SERVO_TRIM_RANGE);
    }

    /// Whether any persisted field differs from `other`
    pub fn differs_from(&self, other: &DeviceProfile) -> bool {
        self.display_name != other.display_name
            || self.is_use_motion != other.is_use_motion
            || self.is_motor_flip != other.is_motor_flip
            || self.is_servo_flip != other.is_servo_flip
            || self.servo_swing != other.servo_swing
            || self.servo_trim != other.servo_trim
            || self.sub_servo_trim != other.sub_servo_trim
    }
}
