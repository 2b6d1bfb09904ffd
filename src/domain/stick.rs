//! Touch Stick
//!
//! Two on-screen sticks sharing one touch surface: a vertical stick on the
//! right drives motor speed and a horizontal stick on the left drives
//! steering. A pointer latches whichever stick's touch zone it lands in and
//! only ever drives that stick until it is released.

use tracing::debug;

const STICK_SIZE_BY_HEIGHT: f32 = 0.4;
const VERTICAL_STICK_HEIGHT_BY_HEIGHT: f32 = 0.9;
const VERTICAL_STICK_TOP_MARGIN_BY_HEIGHT: f32 = 0.05;
const VERTICAL_STICK_CENTER_BY_WIDTH: f32 = 0.75;
const HORIZONTAL_STICK_WIDTH_BY_WIDTH: f32 = 0.4;
const HORIZONTAL_STICK_TOP_MARGIN_BY_HEIGHT: f32 = 0.3;
const HORIZONTAL_STICK_CENTER_BY_WIDTH: f32 = 0.33;
const KNOB_RADIUS_BY_HEIGHT: f32 = 0.2;

/// Full-scale stick value
pub const STICK_VALUE_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }
}

/// Stick geometry derived from the view size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickLayout {
    pub vertical_area: Rect,
    pub horizontal_area: Rect,
    pub knob_radius: f32,
}

impl StickLayout {
    pub fn new(width: f32, height: f32) -> Self {
        let v_width = height * STICK_SIZE_BY_HEIGHT;
        let v_left = width * VERTICAL_STICK_CENTER_BY_WIDTH - v_width / 2.0;
        let v_top = height * VERTICAL_STICK_TOP_MARGIN_BY_HEIGHT;
        let vertical_area = Rect {
            left: v_left,
            top: v_top,
            right: v_left + v_width,
            bottom: v_top + height * VERTICAL_STICK_HEIGHT_BY_HEIGHT,
        };

        let h_width = width * HORIZONTAL_STICK_WIDTH_BY_WIDTH;
        let h_left = width * HORIZONTAL_STICK_CENTER_BY_WIDTH - h_width / 2.0;
        let h_top = height * HORIZONTAL_STICK_TOP_MARGIN_BY_HEIGHT;
        let horizontal_area = Rect {
            left: h_left,
            top: h_top,
            right: h_left + h_width,
            bottom: h_top + height * STICK_SIZE_BY_HEIGHT,
        };

        Self {
            vertical_area,
            horizontal_area,
            knob_radius: height * KNOB_RADIUS_BY_HEIGHT,
        }
    }

    /// Vertical knob travel from center
    pub fn vertical_movable(&self) -> f32 {
        (self.vertical_area.height() - self.knob_radius * 2.0).abs() / 2.0
    }

    /// Horizontal knob travel from center
    pub fn horizontal_movable(&self) -> f32 {
        (self.horizontal_area.width() - self.knob_radius * 2.0).abs() / 2.0
    }

    /// Presses at or right of this x belong to the vertical stick
    pub fn vertical_touch_border(&self) -> f32 {
        (self.horizontal_area.right * 2.0 + self.vertical_area.left * 3.0) / 5.0
    }

    /// Presses at or left of this x belong to the horizontal stick
    pub fn horizontal_touch_border(&self) -> f32 {
        (self.horizontal_area.right * 3.0 + self.vertical_area.left * 2.0) / 5.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Down,
    PointerDown,
    Move,
    Up,
    PointerUp,
    Cancel,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

/// One multi-touch event: `action_index` names the pointer the action
/// applies to; `Move` covers every pointer in `pointers`.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub action: TouchAction,
    pub action_index: usize,
    pub pointers: Vec<TouchPoint>,
}

impl TouchEvent {
    /// Single-pointer event
    pub fn single(action: TouchAction, id: i32, x: f32, y: f32) -> Self {
        Self {
            action,
            action_index: 0,
            pointers: vec![TouchPoint { id, x, y }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickOutput {
    Speed(i32),
    Steering(i32),
}

/// A latched pointer and its clamped offset from the stick center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latch {
    pub touch_id: i32,
    pub offset: f32,
}

#[derive(Debug, Default)]
pub struct StickInput {
    layout: Option<StickLayout>,
    vertical: Option<Latch>,
    horizontal: Option<Latch>,
    horizontal_disabled: bool,
}

impl StickInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute geometry after the view is laid out
    pub fn set_size(&mut self, width: f32, height: f32) {
        self.layout = Some(StickLayout::new(width, height));
    }

    pub fn layout(&self) -> Option<&StickLayout> {
        self.layout.as_ref()
    }

    /// Disable the horizontal stick while motion steering is in charge
    pub fn set_horizontal_disabled(&mut self, disabled: bool) {
        self.horizontal_disabled = disabled;
        if disabled {
            self.horizontal = None;
        }
    }

    pub fn vertical_latch(&self) -> Option<Latch> {
        self.vertical
    }

    pub fn horizontal_latch(&self) -> Option<Latch> {
        self.horizontal
    }

    /// Drop both latches without emitting anything
    pub fn clear(&mut self) {
        self.vertical = None;
        self.horizontal = None;
    }

    pub fn handle_touch(&mut self, event: &TouchEvent) -> Vec<StickOutput> {
        let mut outputs = Vec::new();
        let Some(layout) = self.layout else {
            return outputs;
        };

        match event.action {
            TouchAction::Down | TouchAction::PointerDown => {
                if let Some(point) = event.pointers.get(event.action_index) {
                    if let Some(out) = self.press_vertical(&layout, point) {
                        outputs.extend(out);
                    } else if let Some(out) = self.press_horizontal(&layout, point) {
                        outputs.extend(out);
                    }
                }
            }
            TouchAction::Up | TouchAction::PointerUp | TouchAction::Cancel | TouchAction::Outside => {
                if let Some(point) = event.pointers.get(event.action_index) {
                    outputs.extend(self.release(point.id));
                }
            }
            TouchAction::Move => {
                for point in &event.pointers {
                    if self.vertical.is_some_and(|l| l.touch_id == point.id) {
                        outputs.push(self.update_vertical(&layout, point));
                    }
                    if self.horizontal.is_some_and(|l| l.touch_id == point.id) {
                        outputs.push(self.update_horizontal(&layout, point));
                    }
                }
            }
        }

        outputs
    }

    /// Returns `None` when the press does not belong to the vertical stick
    fn press_vertical(&mut self, layout: &StickLayout, point: &TouchPoint) -> Option<Option<StickOutput>> {
        if let Some(latch) = self.vertical {
            if latch.touch_id == point.id {
                return Some(None);
            }
            return None;
        }
        if point.x < layout.vertical_touch_border() {
            return None;
        }

        debug!("Vertical stick latched by pointer {}", point.id);
        self.vertical = Some(Latch {
            touch_id: point.id,
            offset: 0.0,
        });
        Some(Some(self.update_vertical(layout, point)))
    }

    fn press_horizontal(&mut self, layout: &StickLayout, point: &TouchPoint) -> Option<Option<StickOutput>> {
        if let Some(latch) = self.horizontal {
            if latch.touch_id == point.id {
                return Some(None);
            }
            return None;
        }
        if self.horizontal_disabled || point.x > layout.horizontal_touch_border() {
            return None;
        }

        debug!("Horizontal stick latched by pointer {}", point.id);
        self.horizontal = Some(Latch {
            touch_id: point.id,
            offset: 0.0,
        });
        Some(Some(self.update_horizontal(layout, point)))
    }

    fn release(&mut self, id: i32) -> Vec<StickOutput> {
        let mut outputs = Vec::new();
        if self.vertical.is_some_and(|l| l.touch_id == id) {
            self.vertical = None;
            outputs.push(StickOutput::Speed(0));
        }
        if self.horizontal.is_some_and(|l| l.touch_id == id) {
            self.horizontal = None;
            outputs.push(StickOutput::Steering(0));
        }
        outputs
    }

    fn update_vertical(&mut self, layout: &StickLayout, point: &TouchPoint) -> StickOutput {
        let movable = layout.vertical_movable();
        let offset = clamp_offset(point.y - layout.vertical_area.center_y(), movable);
        if let Some(latch) = self.vertical.as_mut() {
            latch.offset = offset;
        }
        StickOutput::Speed(stick_value(offset, movable))
    }

    fn update_horizontal(&mut self, layout: &StickLayout, point: &TouchPoint) -> StickOutput {
        let movable = layout.horizontal_movable();
        let offset = clamp_offset(point.x - layout.horizontal_area.center_x(), movable);
        if let Some(latch) = self.horizontal.as_mut() {
            latch.offset = offset;
        }
        StickOutput::Steering(stick_value(offset, movable))
    }

    /// Knob x position for a motion steering value in [-1, 1]
    pub fn motion_knob_x(&self, value: f64) -> Option<f32> {
        let layout = self.layout?;
        let offset = (f64::from(layout.horizontal_movable()) * value + 0.05) as i32;
        Some(layout.horizontal_area.center_x() + offset as f32)
    }
}

fn clamp_offset(offset: f32, movable: f32) -> f32 {
    if offset.abs() > movable {
        movable * offset.signum()
    } else {
        offset
    }
}

fn stick_value(offset: f32, movable: f32) -> i32 {
    if movable <= 0.0 {
        return 0;
    }
    (STICK_VALUE_MAX as f32 * offset / movable) as i32
}
