//! # TCP Line Protocol
//!
//! Plain-text front-end for producers that speak a socket instead of HTTP.
//! Every message in either direction is exactly one `\n`-terminated line.
//!
//! ## Server → client
//!
//! ```text
//! Enter a new BPM:                      prompt, sent on connect and after each reading
//! error: invalid input "abc": ...       the previous line was not an integer
//! [{"index":0,...},{"index":1,...}]     the full chain, on every commit and periodically
//! ```
//!
//! ## Client → server
//!
//! One integer reading per line. Whitespace is ignored; anything else gets
//! an `error:` line and a fresh prompt, and the connection stays open.
//! A line longer than [`MAX_LINE_LENGTH`] bytes gets an `error:` line and
//! the connection is closed.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use pulse_protocol::config::{MAX_LINE_LENGTH, TCP_PROMPT};
use pulse_protocol::network::{IngestPipeline, Notification};

use crate::metrics::SharedMetrics;

/// Accept connections forever, one task per peer.
pub async fn serve(
    listener: TcpListener,
    pipeline: IngestPipeline,
    metrics: SharedMetrics,
) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "failed to accept tcp connection");
                continue;
            }
        };

        let pipeline = pipeline.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            info!(%peer, "tcp peer connected");
            metrics.connected_observers.inc();
            if let Err(e) = handle_connection(stream, peer, &pipeline, &metrics).await {
                debug!(%peer, error = %e, "tcp connection ended with error");
            }
            metrics.connected_observers.dec();
            info!(%peer, "tcp peer disconnected");
        });
    }
}

/// Drive one peer: read readings, answer with prompts, and push chain
/// notifications in between. Returns when the peer hangs up.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pipeline: &IngestPipeline,
    metrics: &SharedMetrics,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut observer = pipeline.notifier().subscribe();

    write_line(&mut writer, TCP_PROMPT).await?;

    loop {
        tokio::select! {
            frame = next_frame(&mut reader, &mut buf, MAX_LINE_LENGTH) => match frame? {
                Frame::Line(line) => {
                    let reply = handle_line(pipeline, metrics, &line);
                    debug!(%peer, bytes = line.len(), "tcp reading handled");
                    writer.write_all(reply.as_bytes()).await?;
                }
                Frame::TooLong => {
                    metrics.invalid_inputs_total.inc();
                    warn!(%peer, max = MAX_LINE_LENGTH, "tcp line too long, closing");
                    let reply = format!("error: line longer than {} bytes", MAX_LINE_LENGTH);
                    write_line(&mut writer, &reply).await?;
                    break;
                }
                Frame::Eof => break,
            },
            note = observer.next() => {
                let Some(note) = note else { break };
                send_chain(&mut writer, &note).await?;
            }
        }
    }

    Ok(())
}

/// One read from a peer.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A complete line, terminator stripped.
    Line(String),
    /// More than the allowed bytes arrived without a newline.
    TooLong,
    /// The peer closed its side with nothing pending.
    Eof,
}

/// Read the next `\n`-terminated line, holding at most `max + 1` bytes.
///
/// Partial input stays in `buf` between calls, so the future can be
/// dropped in a `select!` and polled again without losing bytes. A final
/// unterminated line before EOF is returned as a line.
async fn next_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let limit = (max + 1).saturating_sub(buf.len()) as u64;
        let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let line = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            return Ok(Frame::Line(line));
        }
        if buf.len() > max {
            buf.clear();
            return Ok(Frame::TooLong);
        }
        if n == 0 {
            if buf.is_empty() {
                return Ok(Frame::Eof);
            }
            let line = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            return Ok(Frame::Line(line));
        }
    }
}

/// Process one line from a peer and return the text to send back.
fn handle_line(pipeline: &IngestPipeline, metrics: &SharedMetrics, line: &str) -> String {
    let started = Instant::now();
    match pipeline.submit_raw(line) {
        Ok(submission) => {
            metrics.record_submission(&submission, started.elapsed());
            format!("{}\n", TCP_PROMPT)
        }
        Err(e) => {
            metrics.invalid_inputs_total.inc();
            format!("error: {}\n{}\n", e, TCP_PROMPT)
        }
    }
}

async fn send_chain<W>(writer: &mut W, note: &Notification) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(note.chain())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_line(writer, &json).await
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use pulse_protocol::storage::{Block, ChainStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, Lines};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start() -> (SocketAddr, IngestPipeline, SharedMetrics) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pipeline = IngestPipeline::with_store(Arc::new(ChainStore::with_genesis()));
        let metrics = Arc::new(NodeMetrics::new());
        tokio::spawn(serve(listener, pipeline.clone(), metrics.clone()));
        (addr, pipeline, metrics)
    }

    async fn connect(
        addr: SocketAddr,
    ) -> (Lines<BufReader<OwnedReadHalf>>, tokio::net::tcp::OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (r, w) = stream.into_split();
        (BufReader::new(r).lines(), w)
    }

    async fn read_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        timeout(WAIT, lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("connection closed")
    }

    /// Read until a chain line of `len` blocks shows up.
    async fn read_chain_of(lines: &mut Lines<BufReader<OwnedReadHalf>>, len: usize) -> Vec<Block> {
        loop {
            let line = read_line(lines).await;
            if let Ok(chain) = serde_json::from_str::<Vec<Block>>(&line) {
                if chain.len() == len {
                    return chain;
                }
            }
        }
    }

    #[test]
    fn handle_line_replies() {
        let pipeline = IngestPipeline::with_store(Arc::new(ChainStore::with_genesis()));
        let metrics = Arc::new(NodeMetrics::new());

        let ok = handle_line(&pipeline, &metrics, "60");
        assert_eq!(ok, format!("{}\n", TCP_PROMPT));
        assert_eq!(pipeline.snapshot().len(), 2);

        let bad = handle_line(&pipeline, &metrics, "abc");
        assert!(bad.starts_with("error: "));
        assert!(bad.ends_with(&format!("\n{}\n", TCP_PROMPT)));
        assert_eq!(bad.lines().count(), 2);
        assert_eq!(pipeline.snapshot().len(), 2);
        assert_eq!(metrics.invalid_inputs_total.get(), 1);
    }

    #[tokio::test]
    async fn frames_split_on_newlines() {
        let mut input: &[u8] = b"60\r\n 7 2 \nlast";
        let mut buf = Vec::new();
        assert_eq!(next_frame(&mut input, &mut buf, 16).await.unwrap(), Frame::Line("60".into()));
        assert_eq!(next_frame(&mut input, &mut buf, 16).await.unwrap(), Frame::Line(" 7 2 ".into()));
        assert_eq!(next_frame(&mut input, &mut buf, 16).await.unwrap(), Frame::Line("last".into()));
        assert_eq!(next_frame(&mut input, &mut buf, 16).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn frame_over_the_cap_is_refused() {
        let exact = format!("{}\n", "1".repeat(8));
        let mut input = exact.as_bytes();
        let mut buf = Vec::new();
        assert_eq!(
            next_frame(&mut input, &mut buf, 8).await.unwrap(),
            Frame::Line("1".repeat(8))
        );

        let long = "9".repeat(1 << 20);
        let mut input = long.as_bytes();
        assert_eq!(next_frame(&mut input, &mut buf, 8).await.unwrap(), Frame::TooLong);
        assert!(buf.is_empty());
        // Only max + 1 bytes were taken from the reader.
        assert_eq!(input.len(), (1 << 20) - 9);
    }

    #[tokio::test]
    async fn overlong_line_gets_error_and_close() {
        let (addr, pipeline, metrics) = start().await;
        let (mut lines, mut w) = connect(addr).await;
        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);

        w.write_all("9".repeat(MAX_LINE_LENGTH + 1).as_bytes())
            .await
            .unwrap();

        let reply = read_line(&mut lines).await;
        assert!(reply.starts_with("error: line longer than"));
        assert!(reply.len() < 128);
        let closed = timeout(WAIT, lines.next_line()).await.expect("timed out");
        assert!(matches!(closed, Ok(None)));

        assert_eq!(pipeline.snapshot().len(), 1);
        assert_eq!(metrics.invalid_inputs_total.get(), 1);
    }

    #[test]
    fn long_garbage_is_not_echoed_back() {
        let pipeline = IngestPipeline::with_store(Arc::new(ChainStore::with_genesis()));
        let metrics = Arc::new(NodeMetrics::new());

        let raw = "x".repeat(MAX_LINE_LENGTH);
        let reply = handle_line(&pipeline, &metrics, &raw);
        assert!(reply.starts_with("error: "));
        assert!(reply.len() < 256);
    }

    #[tokio::test]
    async fn prompt_then_commit_then_chain() {
        let (addr, pipeline, _metrics) = start().await;
        let (mut lines, mut w) = connect(addr).await;

        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);

        w.write_all(b"60\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);

        let chain = read_chain_of(&mut lines, 2).await;
        assert_eq!(chain[1].payload, 60);
        assert_eq!(chain[1].prev_hash, chain[0].hash);
        assert_eq!(pipeline.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn bad_input_keeps_connection_open() {
        let (addr, pipeline, _metrics) = start().await;
        let (mut lines, mut w) = connect(addr).await;
        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);

        w.write_all(b"abc\n").await.unwrap();
        assert!(read_line(&mut lines).await.starts_with("error: "));
        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);
        assert_eq!(pipeline.snapshot().len(), 1);

        w.write_all(b" 7 2 \n").await.unwrap();
        let chain = read_chain_of(&mut lines, 2).await;
        assert_eq!(chain[1].payload, 72);
    }

    #[tokio::test]
    async fn commits_reach_other_peers() {
        let (addr, _pipeline, _metrics) = start().await;
        let (mut watcher, _watcher_w) = connect(addr).await;
        assert_eq!(read_line(&mut watcher).await, TCP_PROMPT);

        let (mut lines, mut w) = connect(addr).await;
        assert_eq!(read_line(&mut lines).await, TCP_PROMPT);
        w.write_all(b"80\n").await.unwrap();

        let chain = read_chain_of(&mut watcher, 2).await;
        assert_eq!(chain[1].payload, 80);
    }
}
