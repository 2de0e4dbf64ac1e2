//! TCP transport: newline-delimited JSON request/reply.
//!
//! One request per line, one reply per line:
//!
//! ```text
//! -> {"clock":5,"content":"A"}
//! <- {"status":"OK"}
//! ```

use crate::error::EnvError;
use crate::network::{PeerLink, RequestHandler};
use crate::types::{Message, MessageReply, PeerAddress};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Bound on a whole send (connect + request + reply).
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Longest request line the server buffers, excluding the newline.
pub const MAX_REQUEST_LEN: usize = 64 * 1024;

/// Client side of the RPC: one short-lived connection per send.
#[derive(Debug, Clone)]
pub struct TcpPeerLink {
    timeout: Duration,
}

impl TcpPeerLink {
    /// Creates a link with the default send timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Creates a link with a custom send timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the configured send timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpPeerLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    async fn send(&self, target: &PeerAddress, message: Message) -> Result<MessageReply, EnvError> {
        match tokio::time::timeout(self.timeout, exchange(target, &message)).await {
            Ok(result) => result,
            Err(_) => Err(EnvError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

async fn exchange(target: &PeerAddress, message: &Message) -> Result<MessageReply, EnvError> {
    let stream = TcpStream::connect(target.socket_addr())
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => EnvError::unreachable(target),
            _ => EnvError::Io(e),
        })?;
    let (read_half, mut write_half) = stream.into_split();

    let mut request = serde_json::to_vec(message)?;
    request.push(b'\n');
    write_half.write_all(&request).await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(EnvError::network(format!("{} closed the connection before replying", target)));
    }

    let reply: MessageReply = serde_json::from_str(line.trim_end())?;
    if reply.is_ok() {
        Ok(reply)
    } else {
        Err(EnvError::protocol(reply.status))
    }
}

/// Serves requests from `listener` until `shutdown` flips to true.
///
/// Each accepted connection gets its own task, so any number of inbound
/// requests can be in flight at once; the handler is the only shared state.
pub async fn serve_tcp<H>(
    listener: TcpListener,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), EnvError>
where
    H: RequestHandler + ?Sized,
{
    let local = listener.local_addr()?;
    info!(addr = %local, "message server listening");

    if *shutdown.borrow() {
        return Ok(());
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        debug!(addr = %local, remote = %remote, "accepted connection");
                        let handler = Arc::clone(&handler);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handler, shutdown).await {
                                debug!(remote = %remote, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(addr = %local, error = %e, "accept failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(addr = %local, "message server stopped");
    Ok(())
}

async fn serve_connection<H>(
    stream: TcpStream,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), EnvError>
where
    H: RequestHandler + ?Sized,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_REQUEST_LEN as u64 + 1);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut line) => read?,
            _ = shutdown.changed() => return Ok(()),
        };
        if read == 0 {
            return Ok(());
        }

        if line.last() != Some(&b'\n') && line.len() > MAX_REQUEST_LEN {
            warn!(len = line.len(), "request line too long, closing connection");
            let reply = MessageReply::error(format!("request exceeds {} bytes", MAX_REQUEST_LEN));
            write_reply(&mut write_half, &reply).await?;
            return Ok(());
        }

        let request = line.trim_ascii();
        if request.is_empty() {
            continue;
        }

        let reply = handler.handle(request);
        write_reply(&mut write_half, &reply).await?;
    }
}

async fn write_reply<W>(writer: &mut W, reply: &MessageReply) -> Result<(), EnvError>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(reply)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use std::sync::Mutex;

    /// Records every decoded message; rejects anything else.
    struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    impl RequestHandler for Recorder {
        fn handle(&self, request: &[u8]) -> MessageReply {
            match serde_json::from_slice::<Message>(request) {
                Ok(msg) => {
                    self.seen.lock().unwrap().push(msg);
                    MessageReply::ok()
                }
                Err(e) => MessageReply::error(e),
            }
        }
    }

    async fn start_server() -> (PeerAddress, Arc<Recorder>, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let (tx, rx) = watch::channel(false);
        tokio::spawn(serve_tcp(listener, Arc::clone(&recorder), rx));
        let addr = PeerAddress::new(NodeId::parse("B").unwrap(), "127.0.0.1", port);
        (addr, recorder, tx)
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let (addr, recorder, _shutdown) = start_server().await;
        let link = TcpPeerLink::new();

        let reply = link.send(&addr, Message::new(5, "A")).await.unwrap();
        assert!(reply.is_ok());

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Message::new(5, "A")]);
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let (addr, recorder, _shutdown) = start_server().await;

        let mut stream = TcpStream::connect(addr.socket_addr()).await.unwrap();
        stream.write_all(b"{\"clock\": \"five\"}\n").await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let reply: MessageReply = serde_json::from_str(line.trim()).unwrap();

        assert!(!reply.is_ok());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_gets_error_reply_and_connection_stays_open() {
        let (addr, recorder, _shutdown) = start_server().await;

        let stream = TcpStream::connect(addr.socket_addr()).await.unwrap();
        let mut reader = BufReader::new(stream);
        reader
            .get_mut()
            .write_all(b"{\"clock\":1,\"content\":\"\xff\xfe\"}\n")
            .await
            .unwrap();

        let mut line = String::new();
        assert!(reader.read_line(&mut line).await.unwrap() > 0);
        let reply: MessageReply = serde_json::from_str(line.trim()).unwrap();
        assert!(reply.status.starts_with("ERROR"));

        reader.get_mut().write_all(b"{\"clock\":2,\"content\":\"A\"}\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        let reply: MessageReply = serde_json::from_str(line.trim()).unwrap();
        assert!(reply.is_ok());

        assert_eq!(recorder.seen.lock().unwrap().as_slice(), &[Message::new(2, "A")]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_closed() {
        let (addr, recorder, _shutdown) = start_server().await;

        let stream = TcpStream::connect(addr.socket_addr()).await.unwrap();
        let mut reader = BufReader::new(stream);
        let flood = vec![b' '; MAX_REQUEST_LEN + 1];
        reader.get_mut().write_all(&flood).await.unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let reply: MessageReply = serde_json::from_str(line.trim()).unwrap();
        assert!(reply.status.starts_with("ERROR"));

        line.clear();
        let rest = tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line)).await;
        assert!(matches!(rest, Ok(Ok(0)) | Ok(Err(_))));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let addr = PeerAddress::new(NodeId::parse("C").unwrap(), "127.0.0.1", port);
        let link = TcpPeerLink::with_timeout(Duration::from_millis(500));

        let result = link.send(&addr, Message::new(1, "A")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(serve_tcp(listener, recorder, rx));

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), server).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
