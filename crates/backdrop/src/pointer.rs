use crate::events::PointerEvent;
use crate::types::ContainerMetrics;

/// Fixed per-frame smoothing used by the particle scene's parallax.
pub const PARALLAX_SMOOTHING: f32 = 0.05;

/// Smoothed 2D pointer offset.
///
/// `target` follows the latest observed pointer position; `current` moves
/// toward it once per frame by linear interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    current: [f32; 2],
    target: [f32; 2],
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_target(&mut self, target: [f32; 2]) {
        self.target = target;
    }

    /// Interpolates toward the target. `factor` is clamped to [0, 1], so the
    /// offset never overshoots.
    pub fn step(&mut self, factor: f32) -> [f32; 2] {
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            1.0
        };
        for axis in 0..2 {
            let delta = self.target[axis] - self.current[axis];
            self.current[axis] += delta * factor;
        }
        self.current
    }

    pub fn current(&self) -> [f32; 2] {
        self.current
    }

    pub fn target(&self) -> [f32; 2] {
        self.target
    }
}

/// Smoothing factor for the laser panel. A non-positive smoothing time means
/// no smoothing at all: the offset snaps to the target every frame.
pub fn laser_smoothing_factor(mouse_smooth_time: f32) -> f32 {
    let smooth = if mouse_smooth_time.is_finite() {
        mouse_smooth_time.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if smooth > 0.0 {
        smooth
    } else {
        1.0
    }
}

/// Tilt target relative to the container rectangle, in the laser's
/// coordinate convention (y up) and scaled by the tilt strength.
pub fn container_tilt(event: &PointerEvent, container: &ContainerMetrics, strength: f32) -> [f32; 2] {
    let width = container.width.max(1.0);
    let height = container.height.max(1.0);
    let x = (event.client_x - container.x) / width;
    let y = (event.client_y - container.y) / height;
    let nx = (x - 0.5) * 2.0;
    let ny = (y - 0.5) * -2.0;
    [nx as f32 * strength, ny as f32 * strength]
}

/// Viewport-normalised pointer in [-1, 1] on both axes (y down).
pub fn viewport_offset(event: &PointerEvent) -> [f32; 2] {
    let width = event.viewport_width.max(1.0);
    let height = event.viewport_height.max(1.0);
    [
        (event.client_x / width * 2.0 - 1.0) as f32,
        (event.client_y / height * 2.0 - 1.0) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(x: f64, y: f64) -> PointerEvent {
        PointerEvent {
            client_x: x,
            client_y: y,
            viewport_width: 800.0,
            viewport_height: 600.0,
        }
    }

    #[test]
    fn zero_smooth_time_snaps_to_target() {
        let factor = laser_smoothing_factor(0.0);
        assert_eq!(factor, 1.0);
        let mut pointer = PointerState::new();
        pointer.set_target([0.01, -0.004]);
        assert_eq!(pointer.step(factor), [0.01, -0.004]);
        assert_eq!(laser_smoothing_factor(-3.0), 1.0);
    }

    #[test]
    fn smoothing_factor_is_clamped() {
        assert_eq!(laser_smoothing_factor(0.25), 0.25);
        assert_eq!(laser_smoothing_factor(4.0), 1.0);
        assert_eq!(laser_smoothing_factor(f32::NAN), 1.0);
    }

    #[test]
    fn converges_monotonically_without_overshoot() {
        for factor in [0.05_f32, 0.3, 0.7, 1.0] {
            let mut pointer = PointerState::new();
            pointer.set_target([1.0, -2.0]);
            let mut last_gap = f32::INFINITY;
            for _ in 0..200 {
                let [x, y] = pointer.step(factor);
                assert!(x <= 1.0 && y >= -2.0, "overshoot at factor {factor}");
                let gap = (1.0 - x).abs() + (y + 2.0).abs();
                assert!(gap <= last_gap);
                last_gap = gap;
            }
            assert!(last_gap < 1e-3);
        }
    }

    #[test]
    fn reset_returns_to_origin() {
        let mut pointer = PointerState::new();
        pointer.set_target([0.5, 0.5]);
        pointer.step(1.0);
        pointer.reset();
        assert_eq!(pointer.current(), [0.0, 0.0]);
        assert_eq!(pointer.target(), [0.0, 0.0]);
    }

    #[test]
    fn container_tilt_is_centered_and_y_up() {
        let container = ContainerMetrics {
            x: 100.0,
            y: 50.0,
            width: 400.0,
            height: 200.0,
            device_pixel_ratio: 1.0,
        };
        assert_eq!(container_tilt(&event(300.0, 150.0), &container, 0.01), [0.0, 0.0]);
        let [x, y] = container_tilt(&event(500.0, 50.0), &container, 0.01);
        assert!((x - 0.01).abs() < 1e-6);
        assert!((y - 0.01).abs() < 1e-6);
    }

    #[test]
    fn viewport_offset_spans_unit_square() {
        assert_eq!(viewport_offset(&event(0.0, 0.0)), [-1.0, -1.0]);
        assert_eq!(viewport_offset(&event(800.0, 600.0)), [1.0, 1.0]);
        assert_eq!(viewport_offset(&event(400.0, 300.0)), [0.0, 0.0]);
    }
}
