use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest message accepted by a single read. Anything longer arrives as
/// several messages.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Messages that end the sender's session instead of being relayed.
pub const TERMINAL_TOKENS: [&str; 5] = ["exit", "quit", "close", "end", "bye"];

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Exact, case-sensitive match against [`TERMINAL_TOKENS`].
pub fn is_terminal_token(message: &[u8]) -> bool {
    TERMINAL_TOKENS
        .iter()
        .any(|token| token.as_bytes() == message)
}

/// Reads one message into `buf`.
///
/// There is no framing on the wire: whatever a single read returns (up to
/// `buf.len()` bytes) is one message. Returns `None` once the peer has closed
/// its side of the connection.
pub async fn read_message<'a, R>(reader: &mut R, buf: &'a mut [u8]) -> io::Result<Option<&'a [u8]>>
where
    R: AsyncRead + Unpin,
{
    let bytes = reader.read(buf).await?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(&buf[..bytes]))
}

/// Writes `message` verbatim and flushes so the peer sees it promptly.
pub async fn write_message<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message).await?;
    writer.flush().await?;
    Ok(())
}

/// Drops the trailing newline left behind by line-oriented input. Senders do
/// this before transmitting; receivers never rely on it.
pub fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(LINE_ENDINGS)
}
