use anyhow::Result;
use gv_common::dedicated_server::run_dedicated_server;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run_dedicated_server()
}
