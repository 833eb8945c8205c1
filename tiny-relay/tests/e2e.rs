use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, ChildStdout, Command},
    time::{sleep, timeout},
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
// Sessions register right after accept; give them a moment before chatting.
const SETTLE: Duration = Duration::from_millis(300);

#[tokio::test]
async fn server_requires_a_port_argument() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tiny-server");
    let output = Command::new(binary).output().await?;

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty(), "usage should be printed to stderr");
    Ok(())
}

#[tokio::test]
async fn client_requires_hostname_and_port() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tiny-client");
    let output = Command::new(binary).arg("localhost").output().await?;

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty(), "usage should be printed to stderr");
    Ok(())
}

#[tokio::test]
async fn server_exits_when_the_port_is_taken() -> Result<()> {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0")?;
    let port = occupied.local_addr()?.port();

    let binary = assert_cmd::cargo::cargo_bin!("tiny-server");
    let output = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .arg(port.to_string())
            .env("NO_COLOR", "1")
            .output(),
    )
    .await??;

    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[tokio::test]
async fn client_fails_for_unknown_hosts() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tiny-client");
    let output = timeout(
        Duration::from_secs(30),
        Command::new(binary)
            .arg("no-such-host.invalid")
            .arg("9")
            .stdin(Stdio::null())
            .output(),
    )
    .await??;

    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn interrupt_closes_clients_and_exits_cleanly() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tiny-server");
    let (mut server, port, log_task) = spawn_server(&binary).await?;

    let mut x = TcpStream::connect(("127.0.0.1", port)).await?;
    let mut y = TcpStream::connect(("127.0.0.1", port)).await?;
    sleep(SETTLE).await;

    x.write_all(b"hello").await?;
    assert_eq!(read_bytes(&mut y).await?, b"hello");
    let mut buf = [0u8; 64];
    assert!(
        timeout(Duration::from_millis(200), x.read(&mut buf)).await.is_err(),
        "x must not hear its own message"
    );

    y.write_all(b"bye").await?;
    assert!(read_bytes(&mut y).await?.is_empty(), "y should be disconnected");

    interrupt(&server)?;
    assert!(
        matches!(
            timeout(READ_TIMEOUT, x.read(&mut buf)).await?,
            Ok(0) | Err(_)
        ),
        "x should be disconnected by shutdown"
    );

    ensure_success(&mut server, "server").await?;
    let _ = log_task.await;
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn client_binary_chats_through_the_relay() -> Result<()> {
    let server_binary = assert_cmd::cargo::cargo_bin!("tiny-server");
    let client_binary = assert_cmd::cargo::cargo_bin!("tiny-client");
    let (mut server, port, log_task) = spawn_server(&server_binary).await?;

    let mut client = Command::new(client_binary)
        .arg("localhost")
        .arg(port.to_string())
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn client")?;
    let mut stdin = client.stdin.take().context("client stdin missing")?;
    let mut stdout = BufReader::new(client.stdout.take().context("client stdout missing")?);

    let mut peer = TcpStream::connect(("127.0.0.1", port)).await?;
    sleep(SETTLE).await;

    stdin.write_all(b"hello from the client\n").await?;
    stdin.flush().await?;
    assert_eq!(read_bytes(&mut peer).await?, b"hello from the client");

    peer.write_all(b"hi back").await?;
    assert_eq!(read_line(&mut stdout).await?, "Server: hi back");

    stdin.write_all(b"bye\n").await?;
    stdin.flush().await?;
    ensure_success(&mut client, "client").await?;

    interrupt(&server)?;
    ensure_success(&mut server, "server").await?;
    let _ = log_task.await;
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn repeated_interrupts_still_exit_cleanly() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("tiny-server");
    let (mut server, port, log_task) = spawn_server(&binary).await?;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await?;
    sleep(SETTLE).await;

    // The process stays a zombie until it is reaped below, so every signal
    // reaches a valid pid even if the first one already ended it.
    for _ in 0..3 {
        interrupt(&server)?;
    }

    let mut buf = [0u8; 64];
    assert!(
        matches!(
            timeout(READ_TIMEOUT, client.read(&mut buf)).await?,
            Ok(0) | Err(_)
        ),
        "client should be disconnected by shutdown"
    );

    ensure_success(&mut server, "server").await?;
    let _ = log_task.await;
    Ok(())
}

async fn spawn_server(binary: &Path) -> Result<(Child, u16, tokio::task::JoinHandle<()>)> {
    let mut child = Command::new(binary)
        .arg("0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .env("RUST_LOG_STYLE", "never")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn server")?;
    let mut stdout = BufReader::new(child.stdout.take().context("server stdout missing")?);

    let port = loop {
        let line = read_line(&mut stdout).await?;
        if let Some(port) = parse_listening_port(&line) {
            break port;
        }
    };

    // Drain further logs in the background so the pipe never fills.
    let log_task = tokio::spawn(drain_stdout(stdout));
    Ok((child, port, log_task))
}

fn parse_listening_port(line: &str) -> Option<u16> {
    let (_, rest) = line.split_once("listening on ")?;
    let addr: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ':')
        .collect();
    addr.rsplit_once(':')?.1.parse().ok()
}

#[cfg(unix)]
fn interrupt(child: &Child) -> Result<()> {
    let pid = child.id().context("server already exited")?;
    let status = std::process::Command::new("kill")
        .arg("-INT")
        .arg(pid.to_string())
        .status()
        .context("failed to run kill")?;
    if !status.success() {
        return Err(anyhow!("kill -INT {pid} failed with {status}"));
    }
    Ok(())
}

async fn read_bytes(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buf = [0u8; 1024];
    let bytes = timeout(READ_TIMEOUT, stream.read(&mut buf)).await??;
    Ok(buf[..bytes].to_vec())
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for line"))??;
    if bytes == 0 {
        return Err(anyhow!("stream closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while let Ok(bytes) = reader.read_line(&mut buffer).await {
        if bytes == 0 {
            break;
        }
        buffer.clear();
    }
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .with_context(|| format!("{name} did not exit"))?
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
