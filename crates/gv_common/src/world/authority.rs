//! Authority and replication: the client prediction buffer and its server-side counterpart.
//! Client-predicted voxel edits ride [`gv_schemas::mutwatcher::MutWatcher`]'s predicted-revision
//! slot conceptually; here the pending table is keyed by the network sequence number that buffer
//! needs for reconciliation against a later [`VoxelChangeUpdate`], since a single chunk revision
//! bump doesn't carry enough information to match a specific in-flight request back to its wire
//! sequence number.

use bevy_math::{EulerRot, Quat, Vec3};
use gv_schemas::coordinates::BlockPos;
use gv_schemas::registry::{BlockId, BlockRegistry};
use gv_schemas::voxel::island::{Island, IslandId};
use gv_schemas::wire::{EntityStateUpdate, VoxelChangeRequest, VoxelChangeUpdate};
use hashbrown::HashMap;

use crate::error::GameError;
use crate::world::island_system::{set_voxel_in_island_client, set_voxel_in_island_server};
use crate::world::World;

fn vec3_to_block_pos(v: Vec3) -> BlockPos {
    BlockPos::new(v.x.round() as i32, v.y.round() as i32, v.z.round() as i32)
}

fn block_pos_to_vec3(p: BlockPos) -> Vec3 {
    let v = p.into_ivec3();
    Vec3::new(v.x as f32, v.y as f32, v.z as f32)
}

/// A client's record of an optimistically applied voxel edit, kept until the matching
/// [`VoxelChangeUpdate`] arrives (or is superseded by a newer prediction at the same position).
#[derive(Copy, Clone, Debug)]
pub struct PendingVoxelPrediction {
    /// The island the edit targeted.
    pub island_id: IslandId,
    /// Island-local position of the edited voxel.
    pub local_pos: BlockPos,
    /// The voxel the client optimistically wrote.
    pub predicted_voxel: BlockId,
    /// The voxel that was there before, for rollback if the server disagrees.
    pub previous_voxel: BlockId,
}

/// Outcome of reconciling a server [`VoxelChangeUpdate`] against the client's pending table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReconcileOutcome {
    /// The update matched a pending prediction exactly; nothing further to apply.
    Confirmed,
    /// A pending prediction existed but disagreed with the server; the server's value was
    /// applied over it.
    Reconciled,
    /// No pending prediction existed for this sequence number; the server's value was applied
    /// directly.
    AppliedDirectly,
}

/// Client-side authority state: the sequence counter and pending-prediction table.
#[derive(Default)]
pub struct ClientAuthorityState {
    next_sequence: u32,
    pending: HashMap<u32, PendingVoxelPrediction>,
}

impl ClientAuthorityState {
    /// Constructs an empty client authority state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistically applies a voxel edit to the client's own view of `world` and records a
    /// pending prediction, returning the request to send to the server. Fails (without mutating
    /// anything or consuming a sequence number) if the target chunk is not loaded client-side.
    pub fn predict_voxel_change(
        &mut self,
        world: &mut World,
        island_id: IslandId,
        local_pos: BlockPos,
        voxel: BlockId,
        registry: &BlockRegistry,
    ) -> Result<VoxelChangeRequest, GameError> {
        let previous_voxel = world
            .island(island_id)
            .ok_or_else(|| GameError::invalid_argument(format!("no island {island_id:?}")))?
            .get_voxel(local_pos);
        set_voxel_in_island_client(world, island_id, local_pos, voxel, registry)?;

        let sequence_number = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.pending.insert(
            sequence_number,
            PendingVoxelPrediction {
                island_id,
                local_pos,
                predicted_voxel: voxel,
                previous_voxel,
            },
        );
        Ok(VoxelChangeRequest {
            sequence_number,
            island_id: island_id.0,
            local_pos: block_pos_to_vec3(local_pos),
            voxel,
        })
    }

    /// Reconciles a server [`VoxelChangeUpdate`] against the pending table, applying the
    /// server's value to `world` via the client-with-mesh write path (so the next frame's render
    /// is consistent) unless the prediction already matched. Falls back to the non-mesh-updating
    /// server write only if the chunk has not actually been loaded client-side yet, mirroring the
    /// client write path's own unloaded-chunk contract.
    pub fn reconcile_voxel_update(&mut self, world: &mut World, update: &VoxelChangeUpdate, registry: &BlockRegistry) -> ReconcileOutcome {
        let island_id = IslandId(update.island_id);
        let local_pos = vec3_to_block_pos(update.local_pos);
        match self.pending.remove(&update.sequence_number) {
            Some(pending) if pending.island_id == island_id && pending.local_pos == local_pos && pending.predicted_voxel == update.voxel => {
                ReconcileOutcome::Confirmed
            }
            Some(_) => {
                apply_reconciled_value(world, island_id, local_pos, update.voxel, registry);
                ReconcileOutcome::Reconciled
            }
            None => {
                apply_reconciled_value(world, island_id, local_pos, update.voxel, registry);
                ReconcileOutcome::AppliedDirectly
            }
        }
    }

    /// Number of predictions still awaiting server confirmation.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Applies a reconciled voxel value through the client-with-mesh write path, falling back to the
/// authoritative (non-mesh-updating) path only if the chunk is not loaded client-side at all.
fn apply_reconciled_value(world: &mut World, island_id: IslandId, local_pos: BlockPos, voxel: BlockId, registry: &BlockRegistry) {
    if set_voxel_in_island_client(world, island_id, local_pos, voxel, registry).is_err() {
        let _ = set_voxel_in_island_server(world, island_id, local_pos, voxel, registry);
    }
}

/// Server-side: validates and applies a client's voxel edit request, producing the update to
/// broadcast. An unknown island is reported as [`GameError::InvalidArgument`] so the caller can
/// log and ignore it per the orchestrator's failure contract, rather than crash the tick.
pub fn handle_voxel_change_request(world: &mut World, request: &VoxelChangeRequest, author_player_id: u32, registry: &BlockRegistry) -> Result<VoxelChangeUpdate, GameError> {
    let island_id = IslandId(request.island_id);
    let local_pos = vec3_to_block_pos(request.local_pos);
    set_voxel_in_island_server(world, island_id, local_pos, request.voxel, registry)?;
    Ok(VoxelChangeUpdate {
        sequence_number: request.sequence_number,
        island_id: request.island_id,
        local_pos: request.local_pos,
        voxel: request.voxel,
        author_player_id,
    })
}

/// Position-error band used to reconcile a client's predicted island kinematics against a
/// server [`EntityStateUpdate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CorrectionBand {
    /// `< 0.1`: accept the server's velocity only, leave position untouched.
    Accept,
    /// `0.1..=2.0`: nudge with a corrective velocity proportional to the error.
    Corrective,
    /// `> 2.0`: snap straight to the server's position.
    Snap,
}

const CORRECTION_ACCEPT_THRESHOLD: f32 = 0.1;
const CORRECTION_SNAP_THRESHOLD: f32 = 2.0;
const CORRECTION_GAIN: f32 = 0.8;

fn correction_band(error_len: f32) -> CorrectionBand {
    if error_len < CORRECTION_ACCEPT_THRESHOLD {
        CorrectionBand::Accept
    } else if error_len <= CORRECTION_SNAP_THRESHOLD {
        CorrectionBand::Corrective
    } else {
        CorrectionBand::Snap
    }
}

/// Applies a 10 Hz [`EntityStateUpdate`] to an island's kinematic state: velocity, angular
/// velocity, and orientation are always taken from the server; position is corrected according
/// to [`CorrectionBand`].
pub fn apply_entity_state_update(island: &mut Island, update: &EntityStateUpdate) -> CorrectionBand {
    island.velocity = update.velocity;
    island.angular_velocity = update.angular_velocity;
    island.transform.rotation = Quat::from_euler(EulerRot::XYZ, update.rotation.x, update.rotation.y, update.rotation.z);

    let error = update.position - island.transform.position;
    let band = correction_band(error.length());
    match band {
        CorrectionBand::Accept => {}
        CorrectionBand::Corrective => island.velocity += error * CORRECTION_GAIN,
        CorrectionBand::Snap => island.transform.position = update.position,
    }
    band
}

/// Per-island piloting state: `idle -> piloted -> idle`, mirroring the server-side state machine
/// from the spec. A piloted island is reported as needing a physics update every tick inputs keep
/// arriving for it; the orchestrator is responsible for demoting an island back to idle once its
/// input stream goes quiet.
#[derive(Default)]
pub struct PilotingController {
    piloted: HashMap<IslandId, ()>,
}

const PILOTING_THRUST_SCALE: f32 = 5.0;
const PILOTING_ROTATION_SCALE: f32 = 1.0;

impl PilotingController {
    /// Constructs a controller with no islands currently piloted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one piloting input to `island` over `dt` seconds, marking it piloted. Vertical
    /// thrust is an acceleration, integrated into velocity rather than stepped onto it directly;
    /// rotation is yaw-only, assigned rather than accumulated, since piloting steers about the
    /// vertical axis and has no pitch/roll authority.
    pub fn apply_input(&mut self, island: &mut Island, island_id: IslandId, thrust_y: f32, yaw: f32, dt: f32) {
        self.piloted.insert(island_id, ());
        island.velocity += Vec3::Y * thrust_y * PILOTING_THRUST_SCALE * dt;
        island.angular_velocity.y = yaw * PILOTING_ROTATION_SCALE;
    }

    /// Whether `island_id` is currently in the piloted state.
    pub fn is_piloted(&self, island_id: IslandId) -> bool {
        self.piloted.contains_key(&island_id)
    }

    /// Every island currently in the piloted state.
    pub fn piloted_ids(&self) -> Vec<IslandId> {
        self.piloted.keys().copied().collect()
    }

    /// Demotes `island_id` back to idle, e.g. after its input stream has gone quiet for a tick.
    pub fn set_idle(&mut self, island_id: IslandId) {
        self.piloted.remove(&island_id);
    }
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName, RenderClass};
    use gv_schemas::voxel::chunk::Chunk;
    use gv_schemas::voxel::island::IslandTransform;

    use super::*;
    use crate::world::island_system::{add_chunk_to_island, create_island};

    fn stone_registry() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        reg.register(BlockDefinition {
            name: RegistryName::gv("stone"),
            render_class: RenderClass::VoxelCube,
            durability: 1,
        })
        .unwrap();
        reg
    }

    fn world_with_loaded_island() -> (World, IslandId) {
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        add_chunk_to_island(&mut world, id, gv_schemas::coordinates::ChunkPos::ZERO, Chunk::new(BlockId::AIR)).unwrap();
        (world, id)
    }

    #[test]
    fn confirmed_prediction_matches_server_value() {
        let registry = stone_registry();
        let (mut world, id) = world_with_loaded_island();
        let mut client = ClientAuthorityState::new();
        let pos = BlockPos::new(4, 4, 4);
        let req = client.predict_voxel_change(&mut world, id, pos, BlockId(1), &registry).unwrap();
        assert_eq!(world.island(id).unwrap().get_voxel(pos), BlockId(1));

        let update = VoxelChangeUpdate {
            sequence_number: req.sequence_number,
            island_id: id.0,
            local_pos: req.local_pos,
            voxel: BlockId(1),
            author_player_id: 1,
        };
        let outcome = client.reconcile_voxel_update(&mut world, &update, &registry);
        assert_eq!(outcome, ReconcileOutcome::Confirmed);
        assert_eq!(client.pending_count(), 0);
        assert_eq!(world.island(id).unwrap().get_voxel(pos), BlockId(1));
    }

    #[test]
    fn mispredicted_voxel_is_overwritten_by_server_value() {
        let registry = stone_registry();
        let (mut world, id) = world_with_loaded_island();
        let mut client = ClientAuthorityState::new();
        let pos = BlockPos::new(4, 4, 4);
        let req = client.predict_voxel_change(&mut world, id, pos, BlockId::AIR /* mispredicted erase */, &registry).unwrap();

        let update = VoxelChangeUpdate {
            sequence_number: req.sequence_number,
            island_id: id.0,
            local_pos: req.local_pos,
            voxel: BlockId(1), // what the server actually applied
            author_player_id: 1,
        };
        let outcome = client.reconcile_voxel_update(&mut world, &update, &registry);
        assert_eq!(outcome, ReconcileOutcome::Reconciled);
        assert_eq!(world.island(id).unwrap().get_voxel(pos), BlockId(1));
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn reconciliation_updates_mesh_via_the_client_write_path() {
        let registry = stone_registry();
        let (mut world, id) = world_with_loaded_island();
        world.island_mut(id).unwrap().mark_client_side();
        let mut client = ClientAuthorityState::new();
        let pos = BlockPos::new(4, 4, 4);

        let update = VoxelChangeUpdate {
            sequence_number: 0,
            island_id: id.0,
            local_pos: block_pos_to_vec3(pos),
            voxel: BlockId(1),
            author_player_id: 1,
        };
        let outcome = client.reconcile_voxel_update(&mut world, &update, &registry);
        assert_eq!(outcome, ReconcileOutcome::AppliedDirectly);
        let island = world.island(id).unwrap();
        assert_eq!(island.get_voxel(pos), BlockId(1));
        let (chunk_coord, in_chunk) = pos.split_chunk_component();
        let mesh = island.chunks[&chunk_coord].read().mesh.as_ref().unwrap();
        assert!(mesh.len() > 0, "client-with-mesh reconciliation should have produced exposed faces");
        let _ = in_chunk;
    }

    #[test]
    fn server_applies_request_and_produces_matching_update() {
        let registry = stone_registry();
        let (mut world, id) = world_with_loaded_island();
        let request = VoxelChangeRequest {
            sequence_number: 1,
            island_id: id.0,
            local_pos: Vec3::new(4.0, 4.0, 4.0),
            voxel: BlockId(1),
        };
        let update = handle_voxel_change_request(&mut world, &request, 42, &registry).unwrap();
        assert_eq!(update.voxel, BlockId(1));
        assert_eq!(update.author_player_id, 42);
        assert_eq!(world.island(id).unwrap().get_voxel(BlockPos::new(4, 4, 4)), BlockId(1));
    }

    fn entity_update_at(position: Vec3, velocity: Vec3) -> EntityStateUpdate {
        EntityStateUpdate {
            sequence_number: 1,
            entity_id: 1,
            entity_type: 1,
            position,
            velocity,
            acceleration: Vec3::ZERO,
            rotation: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            server_timestamp: 0,
            flags: 0,
        }
    }

    #[test]
    fn small_error_is_accepted_without_moving_position() {
        let mut island = Island::create(IslandId(1), IslandTransform {
            position: Vec3::new(100.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        });
        let update = entity_update_at(Vec3::new(100.05, 0.0, 0.0), Vec3::ZERO);
        let band = apply_entity_state_update(&mut island, &update);
        assert_eq!(band, CorrectionBand::Accept);
        assert_eq!(island.transform.position, Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn moderate_error_adds_corrective_velocity() {
        let mut island = Island::create(IslandId(1), IslandTransform {
            position: Vec3::new(100.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        });
        let update = entity_update_at(Vec3::new(100.5, 0.0, 0.0), Vec3::ZERO);
        let band = apply_entity_state_update(&mut island, &update);
        assert_eq!(band, CorrectionBand::Corrective);
        assert!((island.velocity.x - 0.4).abs() < 1e-4);
        assert_eq!(island.transform.position, Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn large_error_snaps_to_server_position() {
        let mut island = Island::create(IslandId(1), IslandTransform {
            position: Vec3::new(100.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        });
        let update = entity_update_at(Vec3::new(103.0, 0.0, 0.0), Vec3::ZERO);
        let band = apply_entity_state_update(&mut island, &update);
        assert_eq!(band, CorrectionBand::Snap);
        assert_eq!(island.transform.position, Vec3::new(103.0, 0.0, 0.0));
    }

    #[test]
    fn piloting_thrust_integrates_as_acceleration_and_marks_piloted() {
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        let mut controller = PilotingController::new();
        controller.apply_input(&mut island, IslandId(1), 1.0, 0.0, 0.5);
        assert!(controller.is_piloted(IslandId(1)));
        assert_eq!(island.velocity, Vec3::new(0.0, 2.5, 0.0));
    }

    #[test]
    fn piloting_yaw_assigns_angular_velocity_y_only() {
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        island.angular_velocity = Vec3::new(1.0, 1.0, 1.0);
        let mut controller = PilotingController::new();
        controller.apply_input(&mut island, IslandId(1), 0.0, 0.5, 1.0);
        assert_eq!(island.angular_velocity, Vec3::new(1.0, 0.5, 1.0));
    }
}
