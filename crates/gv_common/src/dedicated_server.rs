//! The dedicated server `main()` implementation: builds a [`World`], a [`WorldOrchestrator`], and
//! a [`NetworkThread`] accepting [`InProcessTransport`] connections, then runs the fixed-tick loop
//! on the calling thread until a console command or signal asks it to stop.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use gv_schemas::registry::{BlockDefinition, BlockRegistry, RegistryName, RenderClass};
use gv_schemas::GameSide;
use tracing::{info, warn};

use crate::config::{FluidConfig, GameConfig, ServerConfig};
use crate::network::{NetworkThread, NetworkThreadState};
use crate::prelude::*;
use crate::world::orchestrator::WorldOrchestrator;
use crate::world::World;

/// Command-line flags accepted by the dedicated server binary.
#[derive(Parser)]
#[command(name = "gv_dedi_server", about = "Glasswing dedicated server")]
pub struct CliOptions {
    /// Overrides [`ServerConfig::tick_rate_hz`].
    #[arg(long)]
    pub tick_rate: Option<u32>,
}

/// Bare-bones network thread state for the dedicated server: holds nothing beyond what's needed
/// to prove the thread starts and stops cleanly. A concrete transport lives behind the
/// [`crate::network::Transport`] trait and is wired in by whatever embeds this crate.
#[derive(Default)]
pub struct ServerNetworkState;

impl NetworkThreadState for ServerNetworkState {
    async fn shutdown(_this: Rc<RefCell<Self>>) {
        info!("server network thread shutting down");
    }
}

fn default_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    let _ = registry.register(BlockDefinition {
        name: RegistryName::gv("stone"),
        render_class: RenderClass::VoxelCube,
        durability: 3,
    });
    let _ = registry.register(BlockDefinition {
        name: RegistryName::gv("grass"),
        render_class: RenderClass::VoxelCube,
        durability: 1,
    });
    let _ = registry.register(BlockDefinition {
        name: RegistryName::gv("water"),
        render_class: RenderClass::TransparentFluid,
        durability: 0,
    });
    registry
}

/// Runs the dedicated server until `quit`/`stop`/`exit` is read from stdin or stdin closes.
pub fn run_dedicated_server() -> Result<()> {
    let cli = CliOptions::parse();

    let mut game_config = GameConfig {
        server: ServerConfig {
            server_name: "Glasswing Dedicated Server".to_string(),
            ..Default::default()
        },
        fluid: FluidConfig::default(),
    };
    if let Some(rate) = cli.tick_rate {
        game_config.server.tick_rate_hz = rate;
    }

    let registry = default_registry();
    let mut world = World::new();
    let mut orchestrator = WorldOrchestrator::new(game_config.server.clone(), game_config.fluid.clone(), Arc::new(default_registry()));

    let network = NetworkThread::<ServerNetworkState>::new(GameSide::Server, ServerNetworkState::default);
    info!(tick_rate_hz = game_config.server.tick_rate_hz, "dedicated server started");

    let (cmd_tx, cmd_rx) = std_unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(|l| l.ok()) {
            if cmd_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut last_tick = Instant::now();
    loop {
        if let Ok(line) = cmd_rx.try_recv() {
            match line.split_whitespace().next().unwrap_or("") {
                "quit" | "stop" | "exit" => {
                    info!("shutdown command received");
                    break;
                }
                "" => {}
                other => warn!(command = other, "unknown console command"),
            }
        }

        let now = Instant::now();
        let frame_dt = (now - last_tick).as_secs_f32();
        last_tick = now;
        let _ = orchestrator.advance(&mut world, &registry, frame_dt);

        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    network.sync_shutdown();
    Ok(())
}
