//! Game configuration handling.

use std::net::SocketAddr;

use smart_default::SmartDefault;

use crate::concurrency::VersionedArc;

/// The server-specific configuration.
#[derive(Clone, Eq, PartialEq, Debug, SmartDefault)]
pub struct ServerConfig {
    /// The server name, as advertised to joining clients.
    #[default = "Glasswing Server"]
    pub server_name: String,
    /// The maximum number of players allowed to join at once.
    #[default = 8]
    pub max_players: u32,
    /// Network addresses to listen on.
    #[default(default_listen_addresses())]
    pub listen_addresses: Vec<SocketAddr>,
    /// Target fixed-timestep rate for the world orchestrator, in Hz. The spec fixes this at 60;
    /// exposed here so tests can run the orchestrator at a faster wall-clock rate.
    #[default = 60]
    pub tick_rate_hz: u32,
    /// Replication broadcast rate for `EntityStateUpdate`, in Hz.
    #[default = 10]
    pub replication_rate_hz: u32,
}

/// Fluid-system tuning constants, broken out from [`ServerConfig`] since they are reused by
/// client-side prediction of particle motion as well as the server's authoritative simulation.
#[derive(Clone, PartialEq, Debug, SmartDefault)]
pub struct FluidConfig {
    /// Radius, in meters, within which a moving entity wakes sleeping water voxels.
    #[default = 2.0]
    pub tug_radius: f32,
    /// Distance, in meters, a tug displaces a newly woken particle's target.
    #[default = 1.0]
    pub tug_distance: f32,
    /// Maximum number of sleeping voxels allowed to wake into active particles in one tick.
    #[default = 32]
    pub max_particles_per_frame: u32,
}

/// All game configuration saved into the config file.
#[derive(Clone, PartialEq, Debug, SmartDefault)]
pub struct GameConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Fluid system tuning.
    pub fluid: FluidConfig,
}

/// A versioned [`GameConfig`] handle, the primary way of accessing configuration from systems.
pub type GameConfigHandle = VersionedArc<GameConfig>;

fn default_listen_addresses() -> Vec<SocketAddr> {
    vec!["0.0.0.0:28032".parse().unwrap(), "[::]:28032".parse().unwrap()]
}
