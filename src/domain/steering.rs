//! Steering Input Model
//!
//! Reconciles the touch sticks and the motion sensors into one stream of
//! speed and steering values in [-100, 100]. Only one steering source is
//! live at a time: when the active profile uses motion, the horizontal touch
//! stick is disabled at dispatch level.

use crate::domain::motion::{MotionSteering, SensorAvailability, SensorSample, SteeringSource};
use crate::domain::profile::DeviceProfile;
use crate::domain::stick::{StickInput, StickOutput, TouchEvent};
use tracing::debug;

/// Value produced for the command scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteeringEvent {
    Speed(i32),
    Steering(i32),
}

impl From<StickOutput> for SteeringEvent {
    fn from(output: StickOutput) -> Self {
        match output {
            StickOutput::Speed(v) => Self::Speed(v),
            StickOutput::Steering(v) => Self::Steering(v),
        }
    }
}

/// Which source currently drives steering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteeringState {
    Idle,
    Manual { touch_id: i32, offset: f32 },
    Motion { smoothed_value: f64 },
}

pub struct SteeringInputModel {
    sensors: SensorAvailability,
    stick: StickInput,
    motion: MotionSteering,
    use_motion: bool,
    visible: bool,
    last_motion: Option<f64>,
}

impl SteeringInputModel {
    pub fn new(sensors: SensorAvailability, accel_window: usize) -> Self {
        Self {
            sensors,
            stick: StickInput::new(),
            motion: MotionSteering::new(accel_window),
            use_motion: false,
            visible: false,
            last_motion: None,
        }
    }

    pub fn set_view_size(&mut self, width: f32, height: f32) {
        self.stick.set_size(width, height);
    }

    pub fn stick(&self) -> &StickInput {
        &self.stick
    }

    /// Adopt a device profile. Motion steering needs an accelerometer.
    pub fn apply_profile(&mut self, profile: &DeviceProfile) {
        self.use_motion = profile.is_use_motion && self.sensors.accelerometer;
        self.stick.set_horizontal_disabled(self.use_motion);
        if self.visible {
            self.register_sensors();
        }
    }

    pub fn is_use_motion(&self) -> bool {
        self.use_motion
    }

    pub fn source(&self) -> SteeringSource {
        self.motion.source()
    }

    pub fn state(&self) -> SteeringState {
        if self.motion.source().is_motion() {
            return match self.last_motion {
                Some(smoothed_value) => SteeringState::Motion { smoothed_value },
                None => SteeringState::Idle,
            };
        }
        match self.stick.horizontal_latch() {
            Some(latch) => SteeringState::Manual {
                touch_id: latch.touch_id,
                offset: latch.offset,
            },
            None => SteeringState::Idle,
        }
    }

    /// Controller view shown or hidden
    pub fn on_visibility_changed(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.register_sensors();
        } else {
            self.reset();
        }
    }

    pub fn on_disconnected(&mut self) {
        self.visible = false;
        self.reset();
    }

    pub fn handle_touch(&mut self, event: &TouchEvent) -> Vec<SteeringEvent> {
        if !self.visible {
            return Vec::new();
        }
        self.stick
            .handle_touch(event)
            .into_iter()
            .map(SteeringEvent::from)
            .collect()
    }

    pub fn handle_sensor(&mut self, sample: SensorSample) -> Option<SteeringEvent> {
        if !self.visible || !self.use_motion {
            return None;
        }
        let reading = self.motion.process(sample)?;
        self.last_motion = Some(reading.normalized);
        Some(SteeringEvent::Steering(reading.steer))
    }

    /// Knob position for the motion indicator, once a reading exists
    pub fn motion_knob_x(&self) -> Option<f32> {
        self.stick.motion_knob_x(self.last_motion?)
    }

    fn register_sensors(&mut self) {
        let source = SteeringSource::select(self.use_motion, self.sensors);
        self.last_motion = None;
        if source.is_motion() {
            self.motion.register(source);
        } else {
            self.motion.unregister();
        }
        self.stick.set_horizontal_disabled(self.use_motion);
    }

    fn reset(&mut self) {
        debug!("Steering input reset");
        self.motion.unregister();
        self.stick.clear();
        self.last_motion = None;
    }
}
