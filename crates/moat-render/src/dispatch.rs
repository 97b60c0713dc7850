use moat_core::{MoatResult, RenderLayer};
use moat_scene::{Scene, VertexSource};

use crate::backend::{ConstantBinding, DrawCall, FrameBegin, RenderBackend};
use crate::frame_ring::FrameResource;

/// Counters for the last recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub draws: usize,
    pub layer_switches: usize,
}

/// Records one frame: layers in [`RenderLayer::DRAW_ORDER`], one pipeline
/// switch per non-empty layer, one indexed draw per item.
#[derive(Debug, Default)]
pub struct RenderItemDispatcher {
    last: DispatchStats,
}

impl RenderItemDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_stats(&self) -> DispatchStats {
        self.last
    }

    pub fn record<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        slot: &FrameResource,
        clear_color: [f32; 4],
    ) -> MoatResult<DispatchStats> {
        backend.begin_frame(&FrameBegin {
            slot: slot.index,
            pass_constants: slot.pass_constants,
            clear_color,
        })?;

        let mut stats = DispatchStats::default();
        for layer in RenderLayer::DRAW_ORDER {
            let items = scene.layer(layer);
            if items.is_empty() {
                continue;
            }
            backend.set_layer(layer)?;
            stats.layer_switches += 1;

            for &handle in items {
                let item = scene.items.get(handle)?;
                let mesh = scene.meshes.get(item.mesh())?;
                let material = scene.materials.get(item.material())?;
                let vertex_buffer = match mesh.vertices {
                    VertexSource::Static(buffer) => buffer,
                    VertexSource::FrameWaves => slot.wave_vertices,
                };
                let region = item.region();
                backend.draw(&DrawCall {
                    vertex_buffer,
                    index_buffer: mesh.index_buffer,
                    topology: item.topology(),
                    index_count: region.index_count,
                    start_index: region.start_index,
                    base_vertex: region.base_vertex,
                    object: ConstantBinding {
                        buffer: slot.object_constants,
                        index: handle.index() as u32,
                    },
                    material: ConstantBinding {
                        buffer: slot.material_constants,
                        index: item.material().index() as u32,
                    },
                    texture: material.texture(),
                })?;
                stats.draws += 1;
            }
        }

        self.last = stats;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::Command;
    use crate::test_harness::TestWorld;
    use moat_core::Topology;

    fn record_frame(world: &mut TestWorld) -> DispatchStats {
        let slot = world.ring.acquire_next(&mut world.backend).expect("acquire");
        let frame = world.ring.slot(slot).expect("slot").clone();
        let stats = world
            .dispatcher
            .record(&mut world.backend, &world.scene, &frame, [0.7, 0.7, 0.7, 1.0])
            .expect("record");
        world.backend.submit().expect("submit");
        let fence = world.backend.signal_fence().expect("signal");
        world.ring.release(slot, fence).expect("release");
        stats
    }

    #[test]
    fn test_layers_drawn_in_order() {
        let mut world = TestWorld::new(3);
        let stats = record_frame(&mut world);
        assert_eq!(stats.layer_switches, 4);
        assert_eq!(stats.draws, world.scene.items.len());

        let frame = world.backend.last_frame().expect("frame");
        assert_eq!(frame.layer_switches(), RenderLayer::DRAW_ORDER.to_vec());

        // Every draw follows the switch to its own layer.
        let mut layer = None;
        for command in &frame.commands {
            match command {
                Command::SetLayer(l) => layer = Some(*l),
                Command::Draw(d) => assert_eq!(Some(d.topology), layer.map(|l| l.topology())),
            }
        }
    }

    #[test]
    fn test_water_reads_current_slot_vertices() {
        let mut world = TestWorld::new(3);
        for expected_slot in [0, 1, 2, 0] {
            record_frame(&mut world);
            let frame = world.backend.last_frame().expect("frame");
            let water = frame.draws().last().expect("water is drawn last");
            let slot = world.ring.slot(expected_slot).expect("slot");
            assert_eq!(water.vertex_buffer, slot.wave_vertices);
            assert_eq!(water.object.buffer, slot.object_constants);
            assert_eq!(water.object.index as usize, world.water.index());
            assert_eq!(frame.begin.pass_constants, slot.pass_constants);
        }
    }

    #[test]
    fn test_draw_uses_item_and_material_indices() {
        let mut world = TestWorld::new(2);
        record_frame(&mut world);
        let frame = world.backend.last_frame().expect("frame");
        let sprites = frame
            .draws()
            .find(|d| d.topology == Topology::PointList)
            .expect("sprite draw");
        assert_eq!(sprites.object.index as usize, world.trees.index());
        let wall = frame.draws().next().expect("opaque draw first");
        assert_eq!(wall.object.index as usize, world.wall.index());
        assert_eq!(wall.index_count, 36);
    }

    #[test]
    fn test_empty_layers_skipped() {
        let mut world = TestWorld::empty(2);
        let stats = record_frame(&mut world);
        assert_eq!(stats, DispatchStats::default());
        let frame = world.backend.last_frame().expect("frame");
        assert!(frame.commands.is_empty());
    }
}
