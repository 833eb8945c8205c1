use anyhow::Result;

use tiny_relay::{
    cli::{ClientArgs, parse_or_exit},
    client,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    // Stdout belongs to the conversation, so diagnostics go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ClientArgs = parse_or_exit();
    init_tracing();

    client::run(args).await
}
