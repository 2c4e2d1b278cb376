#![warn(missing_docs)]
#![allow(clippy::type_complexity)]

//! The common client&server simulation code for Glasswing: world state, the authority/
//! replication protocol, structural connectivity, the fluid system, and the async mesh pipeline.
//! None of this crate runs a `bevy::app::App` — the simulation is advanced explicitly by
//! [`world::orchestrator::WorldOrchestrator`] rather than a scheduled ECS graph, since both the
//! dedicated server and a singleplayer client need to step it at their own cadence.

pub mod concurrency;
pub mod config;
pub mod dedicated_server;
pub mod error;
pub mod network;
pub mod prelude;
pub mod promises;
pub mod singleplayer;
pub mod world;

// TODO: populate these from build/git info, as the predecessor engine intended to.
/// The major SemVer field of the current build's version.
pub static GAME_VERSION_MAJOR: u32 = 0;
/// The minor SemVer field of the current build's version.
pub static GAME_VERSION_MINOR: u32 = 1;
/// The patch SemVer field of the current build's version.
pub static GAME_VERSION_PATCH: u32 = 0;
/// The name of the game.
pub static GAME_BRAND_NAME: &str = "Glasswing";

/// Target fixed-timestep rate of the world orchestrator, in Hz. Mirrors
/// [`config::ServerConfig::tick_rate_hz`]'s default; kept as a free constant too since a few call
/// sites (tests, the dedicated-server bootstrap) want it before a `ServerConfig` exists.
pub const TICKS_PER_SECOND: u32 = 60;
/// `1.0 / TICKS_PER_SECOND`, as an `f32`.
pub const SECONDS_PER_TICK: f32 = 1.0 / TICKS_PER_SECOND as f32;
