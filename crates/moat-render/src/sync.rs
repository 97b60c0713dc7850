use moat_core::{Generation, MoatResult};
use moat_scene::{Handle, Material, RenderItem, Scene};

use crate::backend::RenderBackend;
use crate::frame_ring::FrameResource;
use crate::uniforms::{MaterialConstants, ObjectConstants, PassConstants};

/// Writes counted by one [`ConstantSync::sync`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub objects_written: usize,
    pub materials_written: usize,
}

/// Propagates item and material changes into every frame slot.
///
/// Each entity carries a generation that its setters bump. For every slot the
/// sync keeps the generation it last wrote per entity; a slot is rewritten when
/// its watermark is behind. An entity that stopped changing is therefore
/// current in all K slots after K ticks, and each payload is written whole.
pub struct ConstantSync {
    object_marks: Vec<Vec<Generation>>,
    material_marks: Vec<Vec<Generation>>,
}

impl ConstantSync {
    pub fn new(slot_count: usize) -> Self {
        Self {
            object_marks: vec![Vec::new(); slot_count],
            material_marks: vec![Vec::new(); slot_count],
        }
    }

    /// Rewrite every stale object and material entry of `slot`.
    pub fn sync<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: &FrameResource,
        scene: &Scene,
    ) -> MoatResult<SyncStats> {
        let layout = backend.matrix_layout();
        let mut stats = SyncStats::default();
        if slot.index >= self.object_marks.len() {
            self.object_marks.resize(slot.index + 1, Vec::new());
            self.material_marks.resize(slot.index + 1, Vec::new());
        }

        let marks = &mut self.object_marks[slot.index];
        marks.resize(scene.items.len(), Generation::NEVER);
        for (handle, item) in scene.items.iter() {
            let mark = &mut marks[handle.index()];
            if *mark < item.generation() {
                let payload = ObjectConstants::from_item(item, layout);
                backend.write_at(slot.object_constants, handle.index(), bytemuck::bytes_of(&payload))?;
                *mark = item.generation();
                stats.objects_written += 1;
            }
        }

        let marks = &mut self.material_marks[slot.index];
        marks.resize(scene.materials.len(), Generation::NEVER);
        for (handle, material) in scene.materials.iter() {
            let mark = &mut marks[handle.index()];
            if *mark < material.generation() {
                let payload = MaterialConstants::from_material(material, layout);
                backend.write_at(slot.material_constants, handle.index(), bytemuck::bytes_of(&payload))?;
                *mark = material.generation();
                stats.materials_written += 1;
            }
        }

        if stats.objects_written + stats.materials_written > 0 {
            log::trace!(
                "slot {}: wrote {} object and {} material constants",
                slot.index,
                stats.objects_written,
                stats.materials_written
            );
        }
        Ok(stats)
    }

    /// Pass constants are rebuilt every tick and written unconditionally.
    pub fn write_pass<B: RenderBackend + ?Sized>(
        backend: &mut B,
        slot: &FrameResource,
        pass: &PassConstants,
    ) -> MoatResult<()> {
        backend.write_at(slot.pass_constants, 0, bytemuck::bytes_of(pass))
    }

    /// Slots still holding an outdated copy of `item` (its dirty count).
    pub fn pending_object_slots(&self, scene: &Scene, item: Handle<RenderItem>) -> usize {
        let Ok(current) = scene.items.get(item).map(RenderItem::generation) else {
            return 0;
        };
        count_stale(&self.object_marks, item.index(), current)
    }

    /// Slots still holding an outdated copy of `material`.
    pub fn pending_material_slots(&self, scene: &Scene, material: Handle<Material>) -> usize {
        let Ok(current) = scene.materials.get(material).map(Material::generation) else {
            return 0;
        };
        count_stale(&self.material_marks, material.index(), current)
    }
}

fn count_stale(marks: &[Vec<Generation>], index: usize, current: Generation) -> usize {
    marks
        .iter()
        .filter(|slot| slot.get(index).copied().unwrap_or(Generation::NEVER) < current)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::TestWorld;
    use glam::{Mat4, Vec3};

    fn tick(world: &mut TestWorld) -> SyncStats {
        let slot = world.ring.acquire_next(&mut world.backend).expect("acquire");
        let frame = world.ring.slot(slot).expect("slot").clone();
        let stats = world
            .sync
            .sync(&mut world.backend, &frame, &world.scene)
            .expect("sync");
        let fence = world.backend.signal_fence().expect("signal");
        world.ring.release(slot, fence).expect("release");
        stats
    }

    fn world_of(world: &TestWorld, slot: usize, item: Handle<RenderItem>) -> Mat4 {
        let buffer = world.ring.slot(slot).expect("slot").object_constants;
        let constants: ObjectConstants = world
            .backend
            .read_pod(buffer, item.index())
            .expect("object constants");
        Mat4::from_cols_array_2d(&constants.world)
    }

    #[test]
    fn test_initial_sync_fills_every_slot_once() {
        let mut world = TestWorld::new(3);
        let items = world.scene.items.len();
        let materials = world.scene.materials.len();
        for _ in 0..3 {
            let stats = tick(&mut world);
            assert_eq!(stats.objects_written, items);
            assert_eq!(stats.materials_written, materials);
        }
        assert_eq!(tick(&mut world), SyncStats::default());
    }

    #[test]
    fn test_mutation_reaches_all_slots_within_k_ticks() {
        let k = 3;
        let mut world = TestWorld::new(k);
        for _ in 0..k {
            tick(&mut world);
        }

        let moved = Mat4::from_translation(Vec3::new(4.0, 0.0, -2.0));
        let item = world.wall;
        world.scene.items.get_mut(item).expect("live").set_world(moved);
        assert_eq!(world.sync.pending_object_slots(&world.scene, item), k);

        for remaining in (0..k).rev() {
            let stats = tick(&mut world);
            assert_eq!(stats.objects_written, 1);
            assert_eq!(world.sync.pending_object_slots(&world.scene, item), remaining);
        }
        for slot in 0..k {
            assert_eq!(world_of(&world, slot, item), moved);
        }
        // Stable afterwards: nothing left to write.
        assert_eq!(tick(&mut world).objects_written, 0);
    }

    #[test]
    fn test_repeated_mutation_only_latest_survives() {
        let mut world = TestWorld::new(2);
        tick(&mut world);
        tick(&mut world);
        let item = world.wall;
        for x in 1..=5 {
            world
                .scene
                .items
                .get_mut(item)
                .expect("live")
                .set_world(Mat4::from_translation(Vec3::X * x as f32));
            tick(&mut world);
        }
        tick(&mut world);
        let expected = Mat4::from_translation(Vec3::X * 5.0);
        assert_eq!(world_of(&world, 0, item), expected);
        assert_eq!(world_of(&world, 1, item), expected);
        assert_eq!(world.sync.pending_object_slots(&world.scene, item), 0);
    }

    #[test]
    fn test_material_change_tracked() {
        let mut world = TestWorld::new(2);
        tick(&mut world);
        tick(&mut world);
        let water = world.water_material;
        world
            .scene
            .materials
            .get_mut(water)
            .expect("live")
            .scroll_texture(0.25, 0.0);
        assert_eq!(world.sync.pending_material_slots(&world.scene, water), 2);
        assert_eq!(tick(&mut world).materials_written, 1);
        assert_eq!(world.sync.pending_material_slots(&world.scene, water), 1);

        let buffer = world.ring.current().material_constants;
        let constants: MaterialConstants = world
            .backend
            .read_pod(buffer, water.index())
            .expect("material constants");
        assert_eq!(constants.transform[3][0], 0.25);
    }
}
