//! The wire protocol: a 1-byte tag followed by a `bincode`-encoded payload. Multi-byte fields are
//! little-endian on the wire (closing the spec's Open Question 1 on endianness); the tag values
//! below are normative and must not be renumbered, since both peers of a connection are assumed
//! to be running the same binary but the tag is still the only framing information on the wire.

use bevy_math::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::BlockId;

/// Maximum size, in bytes, of a compressed chunk payload accepted off the wire.
pub const MAX_COMPRESSED_CHUNK_SIZE: u32 = 32 * 1024 * 1024;

/// Maximum number of particles folded into one [`Message::FluidParticleUpdate`].
pub const MAX_FLUID_PARTICLES_PER_UPDATE: usize = 64;

/// Wire tag, kept as its own type so [`Message::tag`] and the decode `match` can't drift apart.
pub type Tag = u8;

macro_rules! tags {
    ($($name:ident = $val:expr),* $(,)?) => {
        $(
            #[allow(missing_docs)]
            pub const $name: Tag = $val;
        )*
    };
}

#[allow(missing_docs)]
pub mod tag {
    use super::Tag;
    tags! {
        PLAYER_MOVEMENT_REQUEST = 2,
        PLAYER_POSITION_UPDATE = 3,
        WORLD_STATE = 5,
        COMPRESSED_CHUNK_DATA = 7,
        VOXEL_CHANGE_REQUEST = 8,
        VOXEL_CHANGE_UPDATE = 9,
        ENTITY_STATE_UPDATE = 10,
        PILOTING_INPUT = 11,
        FLUID_PARTICLE_SPAWN = 12,
        FLUID_PARTICLE_UPDATE = 13,
        FLUID_PARTICLE_DESPAWN = 14,
    }
}

/// Client to server: an optimistic movement request, keyed by a monotonic sequence number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerMovementRequest {
    /// Monotonic per-client sequence number.
    pub sequence_number: u32,
    /// Client-intended position.
    pub intended_position: Vec3,
    /// Client-reported velocity.
    pub velocity: Vec3,
    /// Frame delta time, seconds.
    pub delta_time: f32,
}

/// Server to client: authoritative player position broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerPositionUpdate {
    /// The player this update is about.
    pub player_id: u32,
    /// Echoes the client's sequence number this update resolves, if any.
    pub sequence_number: u32,
    /// Authoritative position.
    pub position: Vec3,
    /// Authoritative velocity.
    pub velocity: Vec3,
}

/// Server to client: coarse world summary sent on join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Total number of islands known to the server.
    pub num_islands: u32,
    /// Positions of up to the first three islands, for a quick initial view.
    pub island_positions: [Vec3; 3],
    /// Where the joining player should spawn.
    pub player_spawn_position: Vec3,
}

/// Server to client: one chunk's voxel data, compressed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressedChunkData {
    /// Owning island.
    pub island_id: u32,
    /// Chunk coordinate within the island, stored as an integer-valued float per the legacy wire
    /// format (see spec §6: "voxel coordinates in messages are integer-valued stored as floats").
    pub chunk_coord: Vec3,
    /// The island's physics center, for client-side positioning before the island's own
    /// entity-state update arrives.
    pub island_position: Vec3,
    /// Uncompressed size of the voxel array this payload expands to.
    pub original_size: u32,
    /// Compressed payload, capped at [`MAX_COMPRESSED_CHUNK_SIZE`].
    pub compressed_bytes: Vec<u8>,
}

/// Client to server: an optimistic voxel edit request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelChangeRequest {
    /// Monotonic per-client sequence number.
    pub sequence_number: u32,
    /// Target island.
    pub island_id: u32,
    /// Island-local voxel position, integer-valued.
    pub local_pos: Vec3,
    /// `0` = break (air), otherwise the block identifier to place.
    pub voxel: BlockId,
}

/// Server to client: the authoritative resolution of a voxel edit, broadcast to every client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelChangeUpdate {
    /// Echoes the originating client's sequence number (meaningless to other clients).
    pub sequence_number: u32,
    /// Target island.
    pub island_id: u32,
    /// Island-local voxel position, integer-valued.
    pub local_pos: Vec3,
    /// The voxel now present at that position.
    pub voxel: BlockId,
    /// The player whose request caused this change.
    pub author_player_id: u32,
}

/// Server to client: kinematic state for one entity (player, island, or NPC), sent at 10 Hz.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityStateUpdate {
    /// Monotonic counter, unused for ordering (see `server_timestamp`).
    pub sequence_number: u32,
    /// Entity identifier.
    pub entity_id: u32,
    /// 0 = player, 1 = island, 2 = NPC.
    pub entity_type: u8,
    /// World-space position.
    pub position: Vec3,
    /// World-space velocity.
    pub velocity: Vec3,
    /// World-space acceleration, for client-side extrapolation.
    pub acceleration: Vec3,
    /// Orientation as intrinsic XYZ Euler angles, radians.
    pub rotation: Vec3,
    /// Angular velocity, radians/second per axis.
    pub angular_velocity: Vec3,
    /// Server tick timestamp; clients drop updates older than the last one applied per entity.
    pub server_timestamp: u32,
    /// Bit flags (grounded, needs-correction, ...); bit layout is a client-rendering concern.
    pub flags: u8,
}

/// Client to server: piloting input for the island the client currently controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PilotingInput {
    /// Monotonic per-client sequence number.
    pub sequence_number: u32,
    /// Island being piloted.
    pub island_id: u32,
    /// Vertical thrust, -1.0..=1.0.
    pub thrust_y: f32,
    /// Pitch input, -1.0..=1.0.
    pub rotation_pitch: f32,
    /// Yaw input, -1.0..=1.0.
    pub rotation_yaw: f32,
    /// Roll input, -1.0..=1.0.
    pub rotation_roll: f32,
}

/// Server to client: a sleeping water voxel just woke into an active particle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidParticleSpawn {
    /// ECS entity id assigned to the particle.
    pub entity_id: u32,
    /// Island the particle woke from.
    pub island_id: u32,
    /// World-space spawn position.
    pub world_position: Vec3,
    /// Initial velocity.
    pub velocity: Vec3,
    /// Island-local position of the voxel the particle woke from.
    pub original_voxel_pos: Vec3,
}

/// One particle's state within a [`Message::FluidParticleUpdate`] batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidParticleState {
    /// ECS entity id.
    pub entity_id: u32,
    /// Current world-space position.
    pub world_position: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
    /// 0 = active, 1 = settling (sleeping particles are not sent; they are voxels again).
    pub state: u8,
}

/// Server to client: a sleeping water voxel a particle settled back into, or was discarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidParticleDespawn {
    /// ECS entity id being removed client-side.
    pub entity_id: u32,
    /// Island the particle settled into, if any.
    pub island_id: u32,
    /// Final island-local voxel position, if settled (zero otherwise).
    pub settled_voxel_pos: Vec3,
    /// Whether the client should place a water voxel at `settled_voxel_pos`.
    pub should_create_voxel: bool,
}

/// One wire message, tagged by [`tag`] on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// See [`PlayerMovementRequest`].
    PlayerMovementRequest(PlayerMovementRequest),
    /// See [`PlayerPositionUpdate`].
    PlayerPositionUpdate(PlayerPositionUpdate),
    /// See [`WorldState`].
    WorldState(WorldState),
    /// See [`CompressedChunkData`].
    CompressedChunkData(CompressedChunkData),
    /// See [`VoxelChangeRequest`].
    VoxelChangeRequest(VoxelChangeRequest),
    /// See [`VoxelChangeUpdate`].
    VoxelChangeUpdate(VoxelChangeUpdate),
    /// See [`EntityStateUpdate`].
    EntityStateUpdate(EntityStateUpdate),
    /// See [`PilotingInput`].
    PilotingInput(PilotingInput),
    /// See [`FluidParticleSpawn`].
    FluidParticleSpawn(FluidParticleSpawn),
    /// A batch of [`FluidParticleState`], capped at [`MAX_FLUID_PARTICLES_PER_UPDATE`].
    FluidParticleUpdate(Vec<FluidParticleState>),
    /// See [`FluidParticleDespawn`].
    FluidParticleDespawn(FluidParticleDespawn),
}

/// Errors from encoding or decoding a [`Message`].
#[derive(Debug, Error)]
pub enum WireError {
    /// The byte buffer was empty where a tag byte was expected.
    #[error("empty message buffer")]
    Empty,
    /// The tag byte did not match any known message.
    #[error("unknown wire tag {0}")]
    UnknownTag(Tag),
    /// `bincode` failed to (de)serialize the payload.
    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),
    /// A chunk payload declared a compressed size over [`MAX_COMPRESSED_CHUNK_SIZE`].
    #[error("compressed chunk payload of {0} bytes exceeds the {MAX_COMPRESSED_CHUNK_SIZE} byte cap")]
    ChunkPayloadTooLarge(usize),
    /// A fluid particle batch exceeded [`MAX_FLUID_PARTICLES_PER_UPDATE`].
    #[error("fluid particle batch of {0} exceeds the {MAX_FLUID_PARTICLES_PER_UPDATE} cap")]
    ParticleBatchTooLarge(usize),
}

impl Message {
    /// The wire tag this message is framed with.
    pub fn tag(&self) -> Tag {
        match self {
            Message::PlayerMovementRequest(_) => tag::PLAYER_MOVEMENT_REQUEST,
            Message::PlayerPositionUpdate(_) => tag::PLAYER_POSITION_UPDATE,
            Message::WorldState(_) => tag::WORLD_STATE,
            Message::CompressedChunkData(_) => tag::COMPRESSED_CHUNK_DATA,
            Message::VoxelChangeRequest(_) => tag::VOXEL_CHANGE_REQUEST,
            Message::VoxelChangeUpdate(_) => tag::VOXEL_CHANGE_UPDATE,
            Message::EntityStateUpdate(_) => tag::ENTITY_STATE_UPDATE,
            Message::PilotingInput(_) => tag::PILOTING_INPUT,
            Message::FluidParticleSpawn(_) => tag::FLUID_PARTICLE_SPAWN,
            Message::FluidParticleUpdate(_) => tag::FLUID_PARTICLE_UPDATE,
            Message::FluidParticleDespawn(_) => tag::FLUID_PARTICLE_DESPAWN,
        }
    }

    /// Encodes the message into its tag-prefixed wire form.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if let Message::CompressedChunkData(data) = self {
            if data.compressed_bytes.len() > MAX_COMPRESSED_CHUNK_SIZE as usize {
                return Err(WireError::ChunkPayloadTooLarge(data.compressed_bytes.len()));
            }
        }
        if let Message::FluidParticleUpdate(particles) = self {
            if particles.len() > MAX_FLUID_PARTICLES_PER_UPDATE {
                return Err(WireError::ParticleBatchTooLarge(particles.len()));
            }
        }
        let mut out = vec![self.tag()];
        let payload = match self {
            Message::PlayerMovementRequest(m) => bincode::serialize(m),
            Message::PlayerPositionUpdate(m) => bincode::serialize(m),
            Message::WorldState(m) => bincode::serialize(m),
            Message::CompressedChunkData(m) => bincode::serialize(m),
            Message::VoxelChangeRequest(m) => bincode::serialize(m),
            Message::VoxelChangeUpdate(m) => bincode::serialize(m),
            Message::EntityStateUpdate(m) => bincode::serialize(m),
            Message::PilotingInput(m) => bincode::serialize(m),
            Message::FluidParticleSpawn(m) => bincode::serialize(m),
            Message::FluidParticleUpdate(m) => bincode::serialize(m),
            Message::FluidParticleDespawn(m) => bincode::serialize(m),
        }?;
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes a tag-prefixed byte buffer back into a [`Message`].
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let (&tag_byte, payload) = buf.split_first().ok_or(WireError::Empty)?;
        Ok(match tag_byte {
            tag::PLAYER_MOVEMENT_REQUEST => Message::PlayerMovementRequest(bincode::deserialize(payload)?),
            tag::PLAYER_POSITION_UPDATE => Message::PlayerPositionUpdate(bincode::deserialize(payload)?),
            tag::WORLD_STATE => Message::WorldState(bincode::deserialize(payload)?),
            tag::COMPRESSED_CHUNK_DATA => {
                let data: CompressedChunkData = bincode::deserialize(payload)?;
                if data.compressed_bytes.len() > MAX_COMPRESSED_CHUNK_SIZE as usize {
                    return Err(WireError::ChunkPayloadTooLarge(data.compressed_bytes.len()));
                }
                Message::CompressedChunkData(data)
            }
            tag::VOXEL_CHANGE_REQUEST => Message::VoxelChangeRequest(bincode::deserialize(payload)?),
            tag::VOXEL_CHANGE_UPDATE => Message::VoxelChangeUpdate(bincode::deserialize(payload)?),
            tag::ENTITY_STATE_UPDATE => Message::EntityStateUpdate(bincode::deserialize(payload)?),
            tag::PILOTING_INPUT => Message::PilotingInput(bincode::deserialize(payload)?),
            tag::FLUID_PARTICLE_SPAWN => Message::FluidParticleSpawn(bincode::deserialize(payload)?),
            tag::FLUID_PARTICLE_UPDATE => {
                let particles: Vec<FluidParticleState> = bincode::deserialize(payload)?;
                if particles.len() > MAX_FLUID_PARTICLES_PER_UPDATE {
                    return Err(WireError::ParticleBatchTooLarge(particles.len()));
                }
                Message::FluidParticleUpdate(particles)
            }
            tag::FLUID_PARTICLE_DESPAWN => Message::FluidParticleDespawn(bincode::deserialize(payload)?),
            other => return Err(WireError::UnknownTag(other)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn voxel_change_round_trips_with_correct_tag() {
        let msg = Message::VoxelChangeRequest(VoxelChangeRequest {
            sequence_number: 7,
            island_id: 1,
            local_pos: Vec3::new(4.0, 4.0, 4.0),
            voxel: BlockId(3),
        });
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded[0], tag::VOXEL_CHANGE_REQUEST);
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let buf = [250u8, 1, 2, 3];
        assert!(matches!(Message::decode(&buf), Err(WireError::UnknownTag(250))));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(Message::decode(&[]), Err(WireError::Empty)));
    }

    #[test]
    fn oversized_chunk_payload_is_rejected_on_encode() {
        let msg = Message::CompressedChunkData(CompressedChunkData {
            island_id: 1,
            chunk_coord: Vec3::ZERO,
            island_position: Vec3::ZERO,
            original_size: 0,
            compressed_bytes: vec![0u8; MAX_COMPRESSED_CHUNK_SIZE as usize + 1],
        });
        assert!(matches!(msg.encode(), Err(WireError::ChunkPayloadTooLarge(_))));
    }

    #[test]
    fn oversized_particle_batch_is_rejected() {
        let particles = (0..MAX_FLUID_PARTICLES_PER_UPDATE + 1)
            .map(|i| FluidParticleState {
                entity_id: i as u32,
                world_position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                state: 0,
            })
            .collect();
        let msg = Message::FluidParticleUpdate(particles);
        assert!(matches!(msg.encode(), Err(WireError::ParticleBatchTooLarge(_))));
    }
}
