use moat_core::math::surface_texcoord;
use moat_core::{DeviceError, MoatResult};
use moat_render::{
    ConstantSync, DispatchStats, FrameResourceRing, FrameSizes, GpuLight, PassConstants, PassFrame,
    RenderBackend, RenderItemDispatcher,
};
use moat_scene::Vertex;
use moat_sim::{DisturbSchedule, WaveField};

use crate::camera::OrbitCamera;
use crate::castle::{build_castle, Castle};
use crate::config::DemoConfig;
use crate::input::InputState;
use crate::timer::GameTimer;

/// Running totals for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub updates: u64,
    pub frames_rendered: u64,
    pub draws_last_frame: usize,
    pub layer_switches_last_frame: usize,
    pub objects_written: u64,
    pub materials_written: u64,
    pub peak_wave_height: f32,
}

/// Drives one frame at a time: `update(dt)` fills the next ring slot,
/// `render()` records, submits and fences it.
pub struct SceneUpdateLoop<B: RenderBackend> {
    backend: B,
    config: DemoConfig,
    lights: Vec<GpuLight>,
    pub camera: OrbitCamera,
    pub input: InputState,
    timer: GameTimer,
    waves: WaveField,
    disturb: DisturbSchedule,
    castle: Castle,
    ring: FrameResourceRing,
    sync: ConstantSync,
    dispatcher: RenderItemDispatcher,
    pass: Option<PassConstants>,
    wave_vertices: Vec<Vertex>,
    /// Slot filled by `update` and not yet rendered.
    prepared: Option<usize>,
    stats: LoopStats,
}

impl<B: RenderBackend> SceneUpdateLoop<B> {
    pub fn new(mut backend: B, config: DemoConfig) -> MoatResult<Self> {
        config.validate()?;
        let waves = WaveField::new(config.waves)?;
        let disturb = DisturbSchedule::new(config.disturb, waves.row_count(), waves.column_count())?;
        let castle = build_castle(&mut backend, waves.row_count(), waves.column_count())?;
        let ring = FrameResourceRing::new(
            &mut backend,
            config.frame_resources,
            FrameSizes {
                objects: castle.scene.items.len(),
                materials: castle.scene.materials.len(),
                wave_vertices: waves.vertex_count(),
            },
        )?;

        log::info!(
            "SceneUpdateLoop: {}x{} water, {} frame resources, {} lights, disturb seed {}",
            waves.row_count(),
            waves.column_count(),
            ring.len(),
            config.lights.len(),
            config.disturb.seed
        );

        Ok(Self {
            lights: config.gpu_lights(),
            camera: OrbitCamera::new(config.camera),
            input: InputState::new(),
            timer: GameTimer::new(),
            sync: ConstantSync::new(ring.len()),
            dispatcher: RenderItemDispatcher::new(),
            pass: None,
            wave_vertices: vec![Vertex::default(); waves.vertex_count()],
            prepared: None,
            stats: LoopStats::default(),
            backend,
            config,
            waves,
            disturb,
            castle,
            ring,
        })
    }

    /// Advance the simulation by `dt` seconds and fill the next frame slot.
    ///
    /// Order: input, camera, slot acquisition (may block on the slot's
    /// fence), material animation, constant sync, pass constants, wave
    /// disturbance and step, wave vertex upload.
    pub fn update(&mut self, dt: f32) -> MoatResult<()> {
        self.update_frame(dt).inspect_err(|e| {
            if e.is_fatal() {
                log::error!("update failed: {e}");
            }
        })
    }

    fn update_frame(&mut self, dt: f32) -> MoatResult<()> {
        if self.prepared.is_some() {
            // The previous slot was never rendered; its fence is unchanged so
            // it is safe to rewrite it next time round.
            log::warn!("update called twice without render; dropping prepared frame");
        }
        let dt = self.timer.tick(dt)?;

        self.input.apply_to(&mut self.camera);
        self.camera.update_view();

        let slot_index = self.ring.acquire_next(&mut self.backend)?;
        self.prepared = Some(slot_index);
        let slot = self.ring.current();

        let scroll = self.config.water_scroll;
        self.castle
            .scene
            .materials
            .get_mut(self.castle.water_material)?
            .scroll_texture(scroll.u_speed * dt, scroll.v_speed * dt);

        let written = self.sync.sync(&mut self.backend, slot, &self.castle.scene)?;
        self.stats.objects_written += written.objects_written as u64;
        self.stats.materials_written += written.materials_written as u64;

        let viewport = self.config.viewport;
        let pass = PassConstants::from_frame(
            &PassFrame {
                view: self.camera.view(),
                proj: self.camera.projection(&viewport),
                eye: self.camera.eye(),
                render_target: (viewport.width, viewport.height),
                near_z: viewport.near,
                far_z: viewport.far,
                total_time: self.timer.total_time(),
                delta_time: dt,
                ambient_light: self.config.ambient(),
                fog: self.config.fog.to_fog(),
                lights: &self.lights,
            },
            self.backend.matrix_layout(),
        );
        ConstantSync::write_pass(&mut self.backend, slot, &pass)?;
        self.pass = Some(pass);

        self.disturb.tick(dt, &mut self.waves)?;
        self.waves.step(dt)?;
        self.stats.peak_wave_height = self.stats.peak_wave_height.max(self.waves.max_abs_height());

        let (width, depth) = (self.waves.width(), self.waves.depth());
        for (k, vertex) in self.wave_vertices.iter_mut().enumerate() {
            let position = self.waves.position(k);
            *vertex = Vertex::new(position, self.waves.normal(k), surface_texcoord(position, width, depth));
        }
        self.backend
            .write_slice(slot.wave_vertices, 0, bytemuck::cast_slice(&self.wave_vertices))?;

        self.stats.updates += 1;
        Ok(())
    }

    /// Record the prepared slot, submit it and fence it.
    pub fn render(&mut self) -> MoatResult<DispatchStats> {
        self.render_frame().inspect_err(|e| {
            if e.is_fatal() {
                log::error!("render failed: {e}");
            }
        })
    }

    fn render_frame(&mut self) -> MoatResult<DispatchStats> {
        let slot_index = self.prepared.take().ok_or(DeviceError::NotRecording)?;
        let slot = self
            .ring
            .slot(slot_index)
            .ok_or(DeviceError::NotRecording)?;

        let clear = self.config.fog.clear_color();
        let stats = self
            .dispatcher
            .record(&mut self.backend, &self.castle.scene, slot, clear)?;
        self.backend.submit()?;
        let fence = self.backend.signal_fence()?;
        self.ring.release(slot_index, fence)?;

        self.stats.frames_rendered += 1;
        self.stats.draws_last_frame = stats.draws;
        self.stats.layer_switches_last_frame = stats.layer_switches;
        Ok(stats)
    }

    /// `update(dt)` followed by `render()`.
    pub fn tick(&mut self, dt: f32) -> MoatResult<DispatchStats> {
        self.update(dt)?;
        self.render()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn castle(&self) -> &Castle {
        &self.castle
    }

    pub fn castle_mut(&mut self) -> &mut Castle {
        &mut self.castle
    }

    pub fn waves(&self) -> &WaveField {
        &self.waves
    }

    pub fn disturb(&self) -> &DisturbSchedule {
        &self.disturb
    }

    pub fn ring(&self) -> &FrameResourceRing {
        &self.ring
    }

    pub fn sync(&self) -> &ConstantSync {
        &self.sync
    }

    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    /// Pass constants written by the last `update`.
    pub fn pass_constants(&self) -> Option<&PassConstants> {
        self.pass.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use moat_core::{FenceValue, MoatError, RenderLayer};
    use moat_render::{HeadlessBackend, ObjectConstants};
    use moat_sim::{DisturbParams, WaveParams};

    fn small_config() -> DemoConfig {
        DemoConfig {
            waves: WaveParams {
                rows: 16,
                cols: 16,
                ..WaveParams::default()
            },
            disturb: DisturbParams {
                margin: 2,
                ..DisturbParams::default()
            },
            ..DemoConfig::default()
        }
    }

    fn new_loop(backend: HeadlessBackend) -> SceneUpdateLoop<HeadlessBackend> {
        SceneUpdateLoop::new(backend, small_config()).expect("loop builds")
    }

    #[test]
    fn test_tick_draws_every_item_in_layer_order() {
        let mut app = new_loop(HeadlessBackend::new());
        let stats = app.tick(1.0 / 60.0).expect("tick");
        assert_eq!(stats.draws, app.castle().scene.items.len());
        assert_eq!(stats.layer_switches, RenderLayer::COUNT);
        let frame = app.backend().last_frame().expect("frame");
        assert_eq!(frame.layer_switches(), RenderLayer::DRAW_ORDER.to_vec());
        assert_eq!(frame.begin.clear_color, [0.7, 0.7, 0.7, 1.0]);
    }

    #[test]
    fn test_ring_never_runs_ahead_of_gpu() {
        // The simulated GPU keeps up to 5 frames in flight, more than the ring allows.
        let mut app = new_loop(HeadlessBackend::with_latency(5));
        for _ in 0..20 {
            app.update(1.0 / 60.0).expect("update");
            let slot = app.ring().current();
            assert!(slot.fence() <= app.backend().completed_fence());
            app.render().expect("render");
        }
        assert!(app.ring().blocking_waits() > 0);
        let in_flight = app.backend().last_signaled().0 - app.backend().completed_fence().0;
        assert!(in_flight <= app.ring().len() as u64);
    }

    #[test]
    fn test_water_vertices_follow_simulation() {
        let mut app = new_loop(HeadlessBackend::new());
        // Enough simulated time for several disturbances and steps.
        for _ in 0..60 {
            app.tick(1.0 / 60.0).expect("tick");
        }
        assert!(app.disturb().fired() >= 3);
        let slot = app.ring().current().wave_vertices;
        let field = app.waves();
        let k = field.vertex_count() / 2 + field.column_count() / 2;
        let written: Vertex = app.backend().read_pod(slot, k).expect("vertex");
        assert_eq!(written.position, field.position(k).to_array());
        let frame = app.backend().last_frame().expect("frame");
        let water = frame.draws().last().expect("water last");
        assert_eq!(water.vertex_buffer, slot);
    }

    #[test]
    fn test_water_material_scrolls_and_wraps() {
        let mut app = new_loop(HeadlessBackend::new());
        for _ in 0..700 {
            app.tick(1.0 / 60.0).expect("tick");
        }
        let castle = app.castle();
        let water = castle.scene.materials.get(castle.water_material).expect("water");
        let (u, v) = water.texture_offset();
        assert!((0.0..1.0).contains(&u));
        assert!((0.0..1.0).contains(&v));
        // 700 / 60 s at 0.1 per second.
        let expected_u = (700.0_f32 / 60.0 * 0.1).fract();
        assert!((u - expected_u).abs() < 1e-3, "u = {u}, expected {expected_u}");
    }

    #[test]
    fn test_moved_item_reaches_every_slot() {
        let mut app = new_loop(HeadlessBackend::new());
        let k = app.ring().len();
        for _ in 0..k {
            app.tick(1.0 / 60.0).expect("tick");
        }
        let gate = app.castle().scene.items.resolve("gate").expect("gate");
        let moved = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        app.castle_mut().scene.items.get_mut(gate).expect("gate").set_world(moved);
        for _ in 0..k {
            app.tick(1.0 / 60.0).expect("tick");
        }
        assert_eq!(app.sync().pending_object_slots(&app.castle().scene, gate), 0);
        for slot in app.ring().slots() {
            let constants: ObjectConstants = app
                .backend()
                .read_pod(slot.object_constants, gate.index())
                .expect("constants");
            assert_eq!(Mat4::from_cols_array_2d(&constants.world), moved);
        }
    }

    #[test]
    fn test_device_loss_is_fatal() {
        let mut app = new_loop(HeadlessBackend::with_latency(10));
        for _ in 0..3 {
            app.tick(1.0 / 60.0).expect("tick");
        }
        app.backend_mut().lose_device("hang");
        let err = app.update(1.0 / 60.0).expect_err("busy slot cannot be reclaimed");
        assert!(err.is_fatal());
        assert!(matches!(err, MoatError::Device(_)));
    }

    #[test]
    fn test_render_without_update_rejected() {
        let mut app = new_loop(HeadlessBackend::new());
        let err = app.render().expect_err("nothing prepared");
        assert_eq!(err, MoatError::Device(DeviceError::NotRecording));
        assert_eq!(app.backend().last_signaled(), FenceValue::ZERO);
    }

    #[test]
    fn test_pass_constants_track_camera() {
        let mut app = new_loop(HeadlessBackend::new());
        app.input.left_button_down = true;
        app.input.mouse_moved(90.0, 0.0);
        app.tick(0.5).expect("tick");
        let pass = app.pass_constants().expect("pass");
        assert_eq!(pass.eye_position, app.camera.eye().to_array());
        assert_eq!(pass.delta_time, 0.5);
        assert_eq!(pass.light_count, 2);
        assert_eq!(pass.render_target_size, [800.0, 600.0]);
        let written: PassConstants = app
            .backend()
            .read_pod(app.ring().current().pass_constants, 0)
            .expect("pass written");
        assert_eq!(written.eye_position, pass.eye_position);
    }
}
