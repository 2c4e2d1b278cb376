//! Headless singleplayer client: runs a server and client against each other over an in-process
//! transport and pilots whatever island the world generates at the origin. There is no renderer
//! here; presentation is a separate, non-goal layer this binary exists to prove the protocol for.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use gv_common::config::{FluidConfig, ServerConfig};
use gv_common::singleplayer::new_pair;
use gv_schemas::registry::{BlockDefinition, BlockId, BlockRegistry, RegistryName, RenderClass};
use tracing::info;

/// Command-line flags accepted by the singleplayer client binary.
#[derive(Parser)]
#[command(name = "gv_client", about = "Glasswing singleplayer client")]
struct CliOptions {
    /// How many simulated seconds to pilot the test island before exiting.
    #[arg(long, default_value_t = 2.0)]
    run_seconds: f32,
}

fn default_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry
        .register(BlockDefinition {
            name: RegistryName::gv("stone"),
            render_class: RenderClass::VoxelCube,
            durability: 3,
        })
        .expect("stone registration");
    registry
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = CliOptions::parse();
    let registry = default_registry();

    let (mut server, mut client) = new_pair(ServerConfig::default(), FluidConfig::default(), Arc::new(default_registry()));
    let island_id = server.seed_demo_island(BlockId(1), &registry);

    let dt = 1.0 / ServerConfig::default().tick_rate_hz as f32;
    let steps = (cli.run_seconds / dt).round() as u32;
    let mut sequence = 0;
    let start = Instant::now();
    for _ in 0..steps {
        client.send_piloting_input(sequence, island_id, 0.5, 0.0, 0.1, 0.0);
        sequence = sequence.wrapping_add(1);
        server.pump(&registry, dt);
        let applied = client.pump(&registry);
        if applied > 0 {
            info!(applied, pending = client.pending_predictions(), "client applied server updates");
        }
    }

    info!(elapsed_ms = start.elapsed().as_millis(), steps, "singleplayer run complete");
    Ok(())
}
