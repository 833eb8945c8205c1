use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpStream, lookup_host},
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{MAX_MESSAGE_SIZE, is_terminal_token, read_message, strip_line_ending, write_message},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let addr = resolve(&args.hostname, args.port).await?;
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    info!("connected to {addr}");

    let (mut reader, mut writer) = stream.into_split();
    let mut stdin = BufReader::new(tokio::io::stdin());

    run_client_loop(&mut reader, &mut writer, &mut stdin).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

/// Resolves `hostname`, preferring an IPv4 address when one exists.
async fn resolve(hostname: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = lookup_host((hostname, port))
        .await
        .with_context(|| format!("no such host: {hostname}"))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .with_context(|| format!("no addresses found for {hostname}"))
}

async fn run_client_loop<R, W, I>(reader: &mut R, writer: &mut W, stdin: &mut I) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: tokio::io::AsyncBufRead + Unpin,
{
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            server_message = read_message(reader, &mut buf) => {
                if !handle_server_message(server_message?).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !handle_stdin_input(bytes_read?, &input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    Ok(())
}

async fn handle_server_message(message: Option<&[u8]>) -> io::Result<bool> {
    let Some(message) = message else {
        write_stdout("Server closed the connection.").await?;
        return Ok(false);
    };

    write_stdout(&format!("Server: {}", String::from_utf8_lossy(message))).await?;
    if is_terminal_token(message) {
        write_stdout("Received exit command from server. Exiting...").await?;
        return Ok(false);
    }
    Ok(true)
}

async fn handle_stdin_input<W>(bytes_read: usize, input: &str, writer: &mut W) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = strip_line_ending(input);
    if text.is_empty() {
        return Ok(true);
    }

    write_message(writer, text.as_bytes())
        .await
        .context("failed to send message")?;
    Ok(!is_terminal_token(text.as_bytes()))
}

async fn shutdown_connection<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
