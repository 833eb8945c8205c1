use anyhow::Result;
use tracing::{info, warn};

use tiny_relay::{
    cli::{ServerArgs, parse_or_exit},
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerArgs = parse_or_exit();
    init_tracing();

    let server = Server::bind(args.port).await?;
    let addr = server.local_addr()?;
    info!("relay listening on {}", addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("relay exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
