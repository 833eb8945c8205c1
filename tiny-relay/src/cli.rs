use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tiny-server", author, version, about = "Relay chat messages between TCP clients", long_about = None)]
pub struct ServerArgs {
    /// Port to listen on, on every IPv4 interface. Use 0 for an ephemeral port.
    pub port: u16,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tiny-client", author, version, about = "Chat through a tiny-server relay", long_about = None)]
pub struct ClientArgs {
    /// Host name or address of the relay.
    pub hostname: String,

    /// Port the relay listens on.
    pub port: u16,
}

/// Parses the process arguments, exiting with status 1 on a usage error.
///
/// Help and version requests still print to stdout and exit 0.
pub fn parse_or_exit<T: Parser>() -> T {
    T::try_parse().unwrap_or_else(|err| {
        let code = if err.use_stderr() { 1 } else { 0 };
        let _ = err.print();
        std::process::exit(code);
    })
}
