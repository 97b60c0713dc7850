use crate::camera::OrbitCamera;

/// Accumulated pointer input, consumed once per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    pub mouse_dx: f32,
    pub mouse_dy: f32,
    pub left_button_down: bool,
    pub right_button_down: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse_moved(&mut self, dx: f32, dy: f32) {
        self.mouse_dx += dx;
        self.mouse_dy += dy;
    }

    /// Left drags orbit, right drags zoom. Deltas are cleared afterwards.
    pub fn apply_to(&mut self, camera: &mut OrbitCamera) {
        if self.left_button_down {
            camera.on_drag(self.mouse_dx, self.mouse_dy);
        } else if self.right_button_down {
            camera.on_secondary_drag(self.mouse_dx, self.mouse_dy);
        }
        self.clear_deltas();
    }

    /// Clear per-tick deltas (called after the camera consumes them).
    pub fn clear_deltas(&mut self) {
        self.mouse_dx = 0.0;
        self.mouse_dy = 0.0;
    }
}
