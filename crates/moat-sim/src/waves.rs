use glam::Vec3;
use moat_core::constants::TIME_ACCUMULATOR_EPSILON;
use moat_core::{ConfigError, PreconditionError};
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`WaveField`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveParams {
    pub rows: usize,
    pub cols: usize,
    /// Distance between neighbouring grid points (world units).
    pub spatial_step: f32,
    /// Fixed simulation step (seconds).
    pub time_step: f32,
    /// Wave propagation speed (world units per second).
    pub speed: f32,
    /// Damping coefficient (1 / seconds).
    pub damping: f32,
}

impl Default for WaveParams {
    fn default() -> Self {
        Self {
            rows: 128,
            cols: 128,
            spatial_step: 1.0,
            time_step: 0.03,
            speed: 4.0,
            damping: 0.2,
        }
    }
}

impl WaveParams {
    /// Largest stable wave speed for the explicit scheme:
    /// `c < dx / (2 dt) * sqrt(damping * dt + 2)`.
    pub fn max_stable_speed(&self) -> f32 {
        self.spatial_step / (2.0 * self.time_step) * (self.damping * self.time_step + 2.0).sqrt()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::EmptyGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        let positive = [
            ("spatial_step", self.spatial_step),
            ("time_step", self.time_step),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        let non_negative = [("speed", self.speed), ("damping", self.damping)];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        let limit = self.max_stable_speed();
        if self.speed >= limit {
            return Err(ConfigError::UnstableWave {
                speed: self.speed,
                limit,
                spatial_step: self.spatial_step,
                time_step: self.time_step,
                damping: self.damping,
            });
        }
        Ok(())
    }
}

/// Height-field water surface advanced by an explicit finite-difference
/// solution of the damped 2D wave equation.
///
/// Three height buffers play the roles previous / current / next. A step writes
/// only `next` from `previous` and `current`, then rotates the roles, so readers
/// of [`position`](Self::position) and [`normal`](Self::normal) only ever see a
/// completed step.
///
/// Stability: the constructor rejects any `speed >= dx / (2 dt) * sqrt(damping * dt + 2)`.
/// Inside that range the update is bounded; outside it the `K1` term resonates and
/// heights grow without bound.
pub struct WaveField {
    rows: usize,
    cols: usize,
    spatial_step: f32,
    time_step: f32,
    k1: f32,
    k2: f32,
    k3: f32,
    accumulated: f32,
    previous: Vec<f32>,
    current: Vec<f32>,
    next: Vec<f32>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec3>,
    steps_taken: u64,
}

impl WaveField {
    pub fn new(params: WaveParams) -> Result<Self, ConfigError> {
        params.validate()?;

        let WaveParams {
            rows,
            cols,
            spatial_step,
            time_step,
            speed,
            damping,
        } = params;

        let d = damping * time_step + 2.0;
        let e = (speed * speed) * (time_step * time_step) / (spatial_step * spatial_step);
        let k1 = (4.0 - 8.0 * e) / d;
        let k2 = (damping * time_step - 2.0) / d;
        let k3 = (2.0 * e) / d;

        let count = rows * cols;
        log::info!(
            "WaveField: {}x{} grid, dx={}, dt={}, K1={:.5}, K2={:.5}, K3={:.5}",
            rows,
            cols,
            spatial_step,
            time_step,
            k1,
            k2,
            k3
        );

        Ok(Self {
            rows,
            cols,
            spatial_step,
            time_step,
            k1,
            k2,
            k3,
            accumulated: 0.0,
            previous: vec![0.0; count],
            current: vec![0.0; count],
            next: vec![0.0; count],
            normals: vec![Vec3::Y; count],
            tangents: vec![Vec3::X; count],
            steps_taken: 0,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.cols
    }

    pub fn vertex_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn triangle_count(&self) -> usize {
        self.rows.saturating_sub(1) * self.cols.saturating_sub(1) * 2
    }

    /// World-space extent along x.
    pub fn width(&self) -> f32 {
        self.cols as f32 * self.spatial_step
    }

    /// World-space extent along z.
    pub fn depth(&self) -> f32 {
        self.rows as f32 * self.spatial_step
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// `(K1, K2, K3)`: weights of the current cell, the previous cell and the
    /// sum of the four current neighbours.
    pub fn coefficients(&self) -> (f32, f32, f32) {
        (self.k1, self.k2, self.k3)
    }

    /// Time carried over toward the next step.
    pub fn pending_time(&self) -> f32 {
        self.accumulated
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Current height at `(row, col)`.
    ///
    /// # Panics
    /// If `row >= rows` or `col >= cols`.
    pub fn height(&self, row: usize, col: usize) -> f32 {
        self.current[row * self.cols + col]
    }

    /// Current heights, row-major.
    pub fn heights(&self) -> &[f32] {
        &self.current
    }

    pub fn max_abs_height(&self) -> f32 {
        self.current.iter().fold(0.0f32, |acc, h| acc.max(h.abs()))
    }

    /// Position of the vertex at linear index `index = row * cols + col`.
    ///
    /// # Panics
    /// If `index >= vertex_count()`.
    pub fn position(&self, index: usize) -> Vec3 {
        let row = index / self.cols;
        let col = index % self.cols;
        let half_width = (self.cols - 1) as f32 * self.spatial_step * 0.5;
        let half_depth = (self.rows - 1) as f32 * self.spatial_step * 0.5;
        Vec3::new(
            -half_width + col as f32 * self.spatial_step,
            self.current[index],
            half_depth - row as f32 * self.spatial_step,
        )
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        self.normals[index]
    }

    pub fn tangent(&self, index: usize) -> Vec3 {
        self.tangents[index]
    }

    /// Perturb an interior cell: the centre rises by `magnitude`, its four
    /// edge neighbours by `magnitude / 2`.
    ///
    /// `row` must lie in `[1, rows - 2]` and `col` in `[1, cols - 2]`. Anything
    /// else is rejected, never clamped.
    pub fn disturb(&mut self, row: usize, col: usize, magnitude: f32) -> Result<(), PreconditionError> {
        let interior_row = row >= 1 && row + 2 <= self.rows;
        let interior_col = col >= 1 && col + 2 <= self.cols;
        if !(interior_row && interior_col) {
            return Err(PreconditionError::DisturbOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let n = self.cols;
        let k = row * n + col;
        let half = 0.5 * magnitude;
        self.current[k] += magnitude;
        self.current[k + 1] += half;
        self.current[k - 1] += half;
        self.current[k + n] += half;
        self.current[k - n] += half;
        log::trace!("disturb ({row}, {col}) by {magnitude}");
        Ok(())
    }

    /// Accumulate `dt` and run as many fixed steps as it now covers.
    /// Returns the number of steps performed.
    pub fn step(&mut self, dt: f32) -> Result<u32, PreconditionError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(PreconditionError::InvalidTimeStep(dt));
        }
        self.accumulated += dt;

        let mut steps = 0;
        while self.accumulated + TIME_ACCUMULATOR_EPSILON >= self.time_step {
            self.accumulated = (self.accumulated - self.time_step).max(0.0);
            self.advance();
            steps += 1;
        }
        Ok(steps)
    }

    fn advance(&mut self) {
        let (m, n) = (self.rows, self.cols);

        // Boundary cells keep their value: carry them into the buffer that
        // becomes current.
        for j in 0..n {
            self.next[j] = self.current[j];
            self.next[(m - 1) * n + j] = self.current[(m - 1) * n + j];
        }
        for i in 0..m {
            self.next[i * n] = self.current[i * n];
            self.next[i * n + n - 1] = self.current[i * n + n - 1];
        }

        for i in 1..m.saturating_sub(1) {
            for j in 1..n.saturating_sub(1) {
                let k = i * n + j;
                let c = &self.current;
                self.next[k] = self.k1 * c[k]
                    + self.k2 * self.previous[k]
                    + self.k3 * (c[k + n] + c[k - n] + c[k + 1] + c[k - 1]);
            }
        }

        // previous <- current, current <- next, next <- old previous (scratch)
        std::mem::swap(&mut self.previous, &mut self.current);
        std::mem::swap(&mut self.current, &mut self.next);

        self.recompute_normals();
        self.steps_taken += 1;
    }

    fn recompute_normals(&mut self) {
        let (m, n) = (self.rows, self.cols);
        let two_dx = 2.0 * self.spatial_step;
        for i in 1..m.saturating_sub(1) {
            for j in 1..n.saturating_sub(1) {
                let k = i * n + j;
                let l = self.current[k - 1];
                let r = self.current[k + 1];
                let t = self.current[k - n];
                let b = self.current[k + n];
                self.normals[k] = Vec3::new(l - r, two_dx, b - t).normalize();
                self.tangents[k] = Vec3::new(two_dx, r - l, 0.0).normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(rows: usize, cols: usize) -> WaveField {
        WaveField::new(WaveParams {
            rows,
            cols,
            ..WaveParams::default()
        })
        .expect("valid params")
    }

    #[test]
    fn test_rejects_empty_grid() {
        let err = WaveField::new(WaveParams {
            rows: 0,
            ..WaveParams::default()
        })
        .err();
        assert!(matches!(err, Some(ConfigError::EmptyGrid { rows: 0, .. })));
    }

    #[test]
    fn test_rejects_unstable_speed() {
        let params = WaveParams {
            speed: 40.0,
            ..WaveParams::default()
        };
        assert!(matches!(
            WaveField::new(params).err(),
            Some(ConfigError::UnstableWave { .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_steps() {
        let params = WaveParams {
            time_step: 0.0,
            ..WaveParams::default()
        };
        assert!(matches!(
            WaveField::new(params).err(),
            Some(ConfigError::InvalidParameter {
                name: "time_step",
                ..
            })
        ));
    }

    #[test]
    fn test_single_cell_grid_is_valid() {
        let mut field = small(1, 1);
        assert_eq!(field.vertex_count(), 1);
        assert_eq!(field.triangle_count(), 0);
        assert_eq!(field.step(0.1).expect("step"), 3);
        assert_eq!(field.height(0, 0), 0.0);
    }

    #[test]
    fn test_default_coefficients() {
        let field = small(8, 8);
        let (k1, k2, k3) = field.coefficients();
        // e = 16 * 0.0009 = 0.0144, d = 2.006
        assert!((k1 - (4.0 - 8.0 * 0.0144) / 2.006).abs() < 1e-5);
        assert!((k2 - (0.006 - 2.0) / 2.006).abs() < 1e-5);
        assert!((k3 - 0.0288 / 2.006).abs() < 1e-5);
    }

    #[test]
    fn test_disturb_center_and_neighbors_only() {
        let mut field = small(8, 10);
        field.disturb(3, 4, 0.5).expect("interior");
        for row in 0..8 {
            for col in 0..10 {
                let expected = match (row, col) {
                    (3, 4) => 0.5,
                    (2, 4) | (4, 4) | (3, 3) | (3, 5) => 0.25,
                    _ => 0.0,
                };
                assert_eq!(field.height(row, col), expected, "cell ({row}, {col})");
            }
        }
    }

    #[test]
    fn test_disturb_accepts_interior_edges() {
        let mut field = small(6, 6);
        field.disturb(1, 1, 1.0).expect("first interior cell");
        field.disturb(4, 4, 1.0).expect("last interior cell");
        assert_eq!(field.height(1, 1), 1.0);
        assert_eq!(field.height(0, 1), 0.5);
        assert_eq!(field.height(5, 4), 0.5);
    }

    #[test]
    fn test_disturb_rejects_boundary() {
        let mut field = small(6, 6);
        for (row, col) in [(0, 3), (5, 3), (3, 0), (3, 5), (9, 9)] {
            let err = field.disturb(row, col, 1.0).err();
            assert!(
                matches!(err, Some(PreconditionError::DisturbOutOfBounds { .. })),
                "({row}, {col}) should be rejected"
            );
        }
        assert_eq!(field.max_abs_height(), 0.0);
    }

    #[test]
    fn test_disturb_rejects_grid_without_interior() {
        let mut field = small(2, 2);
        assert!(field.disturb(1, 1, 1.0).is_err());
    }

    #[test]
    fn test_step_below_time_step_is_pending() {
        let mut field = small(8, 8);
        field.disturb(4, 4, 1.0).expect("interior");
        assert_eq!(field.step(0.01).expect("step"), 0);
        assert_eq!(field.steps_taken(), 0);
        assert_eq!(field.height(4, 4), 1.0);
        assert!((field.pending_time() - 0.01).abs() < 1e-7);
    }

    #[test]
    fn test_chunked_steps_match_single_step() {
        let mut chunked = small(16, 16);
        let mut whole = small(16, 16);
        chunked.disturb(7, 8, 0.4).expect("interior");
        whole.disturb(7, 8, 0.4).expect("interior");

        let dt = whole.time_step();
        assert_eq!(whole.step(dt).expect("step"), 1);
        assert_eq!(chunked.step(dt / 2.0).expect("step"), 0);
        assert_eq!(chunked.step(dt / 2.0).expect("step"), 1);

        assert_eq!(chunked.heights(), whole.heights());
        for i in 0..whole.vertex_count() {
            assert_eq!(chunked.normal(i), whole.normal(i));
        }
    }

    #[test]
    fn test_thirds_of_a_step_trigger_once() {
        let mut field = small(8, 8);
        let third = field.time_step() / 3.0;
        let steps: u32 = (0..3).map(|_| field.step(third).expect("step")).sum();
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_large_dt_runs_multiple_steps() {
        let mut field = small(8, 8);
        let steps = field.step(field.time_step() * 3.5).expect("step");
        assert_eq!(steps, 3);
        assert_eq!(field.steps_taken(), 3);
    }

    #[test]
    fn test_negative_dt_rejected() {
        let mut field = small(8, 8);
        assert_eq!(
            field.step(-0.1).err(),
            Some(PreconditionError::InvalidTimeStep(-0.1))
        );
        assert!(field.step(f32::NAN).is_err());
    }

    #[test]
    fn test_boundary_never_modified_by_step() {
        let mut field = small(12, 9);
        field.disturb(1, 1, 0.5).expect("interior");
        field.disturb(10, 7, 0.3).expect("interior");
        let boundary: Vec<(usize, usize)> = (0..12)
            .flat_map(|r| (0..9).map(move |c| (r, c)))
            .filter(|&(r, c)| r == 0 || r == 11 || c == 0 || c == 8)
            .collect();
        let before: Vec<f32> = boundary.iter().map(|&(r, c)| field.height(r, c)).collect();

        for _ in 0..50 {
            field.step(field.time_step()).expect("step");
        }

        let after: Vec<f32> = boundary.iter().map(|&(r, c)| field.height(r, c)).collect();
        assert_eq!(before, after);
        // ...while the interior did move
        assert_ne!(field.height(5, 4), 0.0);
    }

    #[test]
    fn test_step_uses_stencil() {
        let mut field = small(5, 5);
        field.disturb(2, 2, 1.0).expect("interior");
        field.step(field.time_step()).expect("step");
        let (k1, _k2, k3) = field.coefficients();
        // previous was zero everywhere
        let center = k1 * 1.0 + k3 * (4.0 * 0.5);
        assert!((field.height(2, 2) - center).abs() < 1e-6);
        let corner_neighbor = k1 * 0.0 + k3 * (0.5 + 0.5);
        assert!((field.height(1, 1) - corner_neighbor).abs() < 1e-6);
    }

    #[test]
    fn test_positions_span_grid() {
        let field = small(3, 5);
        assert_eq!(field.position(0), Vec3::new(-2.0, 0.0, 1.0));
        assert_eq!(field.position(14), Vec3::new(2.0, 0.0, -1.0));
        assert_eq!(field.width(), 5.0);
        assert_eq!(field.depth(), 3.0);
    }

    #[test]
    fn test_flat_surface_normals_point_up() {
        let mut field = small(6, 6);
        field.step(field.time_step()).expect("step");
        for i in 0..field.vertex_count() {
            assert_eq!(field.normal(i), Vec3::Y);
        }
    }

    #[test]
    fn test_normals_tilt_away_from_crest() {
        let mut field = small(9, 9);
        field.disturb(4, 4, 1.0).expect("interior");
        field.step(field.time_step()).expect("step");
        // Cell left of the crest (smaller x) leans toward -x.
        let left = field.normal(4 * 9 + 3);
        assert!(left.x < 0.0, "got {left:?}");
        assert!((left.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_undisturbed_large_grid_stays_flat() {
        let mut field = small(128, 128);
        for _ in 0..1000 {
            field.step(1.0 / 60.0).expect("step");
        }
        assert!(field.steps_taken() > 0);
        assert!(field.heights().iter().all(|&h| h == 0.0));
        assert_eq!(field.max_abs_height(), 0.0);
    }

    #[test]
    fn test_large_grid_stays_stable() {
        let mut field = small(128, 128);
        let magnitude = 0.5;
        field.disturb(64, 64, magnitude).expect("interior");
        for _ in 0..1000 {
            field.step(1.0 / 60.0).expect("step");
        }
        let peak = field.max_abs_height();
        assert!(peak.is_finite());
        assert!(peak <= 10.0 * magnitude, "height blew up: {peak}");
    }
}
