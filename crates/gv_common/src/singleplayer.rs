//! Bundles a [`WorldOrchestrator`] and a client's [`ClientAuthorityState`] on opposite ends of an
//! [`InProcessTransport`] pair, so a single process can run both sides of the authority protocol
//! without a concrete network transport. This is how the `gv_client` binary runs without a
//! dedicated server process, and it's equally useful for integration tests that want a live
//! client/server pair without spinning up sockets.

use std::sync::Arc;

use gv_schemas::registry::BlockRegistry;
use gv_schemas::voxel::island::IslandId;
use gv_schemas::wire::{Message, PilotingInput, VoxelChangeRequest};
use tracing::warn;

use crate::config::{FluidConfig, ServerConfig};
use crate::network::{InProcessTransport, Transport, TransportError};
use crate::world::authority::{self, ClientAuthorityState};
use crate::world::orchestrator::WorldOrchestrator;
use crate::world::World;

/// The server half of an in-process pair: owns the authoritative [`World`] and steps it whenever
/// [`Self::pump`] is called, turning any queued client messages into orchestrator input first.
pub struct SingleplayerServer {
    world: World,
    orchestrator: WorldOrchestrator,
    transport: InProcessTransport,
    next_player_id: u32,
}

impl SingleplayerServer {
    /// Creates a server with an empty world, listening on its half of `transport`.
    pub fn new(server_config: ServerConfig, fluid_config: FluidConfig, registry: Arc<BlockRegistry>, transport: InProcessTransport) -> Self {
        Self {
            world: World::new(),
            orchestrator: WorldOrchestrator::new(server_config, fluid_config, registry),
            transport,
            next_player_id: 1,
        }
    }

    /// Allocates a new island, writes a single voxel into it at the origin, and inserts it into
    /// the world. Exists for demo/test bootstrap where a world needs at least one island to pilot
    /// before any client request has created one.
    pub fn seed_demo_island(&mut self, voxel: gv_schemas::registry::BlockId, registry: &BlockRegistry) -> IslandId {
        let id = self.world.allocate_island_id();
        let mut island = gv_schemas::voxel::island::Island::create(id, gv_schemas::voxel::island::IslandTransform::default());
        island.set_voxel_server(gv_schemas::coordinates::BlockPos::new(0, 0, 0), voxel, registry);
        self.world.insert_island(island);
        id
    }

    /// Drains inbound client messages into the orchestrator's queues, advances the simulation by
    /// `frame_dt` seconds, and sends every resulting update back over the transport.
    pub fn pump(&mut self, registry: &BlockRegistry, frame_dt: f32) {
        loop {
            match self.transport.try_recv() {
                Ok(Some(Message::VoxelChangeRequest(req))) => {
                    self.orchestrator.queue_voxel_change(req, self.next_player_id);
                }
                Ok(Some(Message::PilotingInput(input))) => {
                    self.orchestrator.queue_piloting_input(crate::world::orchestrator::QueuedPilotingInput {
                        island_id: IslandId(input.island_id),
                        thrust_y: input.thrust_y,
                        pitch: input.rotation_pitch,
                        yaw: input.rotation_yaw,
                        roll: input.rotation_roll,
                    });
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(TransportError::Disconnected) => {
                    warn!("singleplayer client disconnected");
                    break;
                }
            }
        }

        for output in self.orchestrator.advance(&mut self.world, registry, frame_dt) {
            for update in output.voxel_updates {
                let _ = self.transport.send(Message::VoxelChangeUpdate(update));
            }
            if let Some(states) = output.entity_state {
                for state in states {
                    let _ = self.transport.send(Message::EntityStateUpdate(state));
                }
            }
        }
    }
}

/// The client half of an in-process pair: holds a client-side [`World`] mirror and the prediction
/// bookkeeping in [`ClientAuthorityState`].
pub struct SingleplayerClient {
    world: World,
    authority: ClientAuthorityState,
    transport: InProcessTransport,
    registry: Arc<BlockRegistry>,
}

impl SingleplayerClient {
    /// Creates a client with an empty world mirror, talking over its half of `transport`.
    pub fn new(transport: InProcessTransport, registry: Arc<BlockRegistry>) -> Self {
        Self {
            world: World::new(),
            authority: ClientAuthorityState::new(),
            transport,
            registry,
        }
    }

    /// Optimistically applies a voxel edit locally and sends the request to the server.
    pub fn request_voxel_change(
        &mut self,
        island_id: IslandId,
        local_pos: gv_schemas::coordinates::BlockPos,
        voxel: gv_schemas::registry::BlockId,
    ) -> Result<(), crate::error::GameError> {
        let request: VoxelChangeRequest = self
            .authority
            .predict_voxel_change(&mut self.world, island_id, local_pos, voxel, &self.registry)?;
        let _ = self.transport.send(Message::VoxelChangeRequest(request));
        Ok(())
    }

    /// Sends a piloting input for the island the client currently controls; not itself predicted,
    /// since island kinematics are corrected wholesale by the next [`gv_schemas::wire::EntityStateUpdate`]
    /// rather than tracked per-input like voxel edits.
    pub fn send_piloting_input(&mut self, sequence_number: u32, island_id: IslandId, thrust_y: f32, pitch: f32, yaw: f32, roll: f32) {
        let _ = self.transport.send(Message::PilotingInput(PilotingInput {
            sequence_number,
            island_id: island_id.0,
            thrust_y,
            rotation_pitch: pitch,
            rotation_yaw: yaw,
            rotation_roll: roll,
        }));
    }

    /// Drains and applies every message the server has sent since the last call, reconciling
    /// voxel predictions and updating island kinematics. Returns the number of messages applied.
    pub fn pump(&mut self, registry: &BlockRegistry) -> usize {
        let mut applied = 0;
        loop {
            match self.transport.try_recv() {
                Ok(Some(Message::VoxelChangeUpdate(update))) => {
                    self.authority.reconcile_voxel_update(&mut self.world, &update, registry);
                    applied += 1;
                }
                Ok(Some(Message::EntityStateUpdate(update))) => {
                    let island_id = IslandId(update.entity_id);
                    if let Some(island) = self.world.island_mut(island_id) {
                        authority::apply_entity_state_update(island, &update);
                    }
                    applied += 1;
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(TransportError::Disconnected) => break,
            }
        }
        applied
    }

    /// Number of voxel predictions still awaiting server confirmation.
    pub fn pending_predictions(&self) -> usize {
        self.authority.pending_count()
    }

    /// The client's local mirror of the world, for read access by a presentation layer.
    pub fn world(&self) -> &World {
        &self.world
    }
}

/// Builds a connected [`SingleplayerServer`]/[`SingleplayerClient`] pair sharing one
/// [`InProcessTransport`] channel.
pub fn new_pair(server_config: ServerConfig, fluid_config: FluidConfig, registry: Arc<BlockRegistry>) -> (SingleplayerServer, SingleplayerClient) {
    let (server_side, client_side) = InProcessTransport::pair();
    (
        SingleplayerServer::new(server_config, fluid_config, registry.clone(), server_side),
        SingleplayerClient::new(client_side, registry),
    )
}
