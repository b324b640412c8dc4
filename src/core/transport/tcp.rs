// src/core/transport/tcp.rs

//! The default transport: length-delimited JSON frames over TCP.
//!
//! Each channel owns one connection to its upstream. Inbound frames are
//! decoded by a reader task and handed to the channel through a bounded
//! mpsc; that task is transport plumbing behind a message-passing boundary,
//! so the agent core stays a single logical actor.

use crate::core::errors::AgentError;
use crate::core::protocol::{Message, MessageCodec};
use crate::core::transport::{Channel, SocketRole};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on inbound frames buffered ahead of the event loop. The reader
/// task blocks when it fills, which backpressures the peer.
const INBOUND_CAPACITY: usize = 1024;

/// Per-connection state, dropped wholesale on close.
struct Live {
    writer: FramedWrite<OwnedWriteHalf, MessageCodec>,
    inbound: mpsc::Receiver<Message>,
    reader: JoinHandle<()>,
}

pub struct TcpChannel {
    role: SocketRole,
    addr: String,
    request_timeout: Duration,
    liveness_timeout: Duration,
    live: Option<Live>,
    /// Topics the SUB role filters on. Shared with the reader task and kept
    /// across reconnects, so no re-subscription is needed.
    topics: Arc<RwLock<HashSet<String>>>,
    /// Updated by the reader task on every inbound frame.
    last_rx: Arc<Mutex<Instant>>,
    last_tx: Instant,
    request_outstanding: bool,
    peeked: Option<Message>,
}

impl TcpChannel {
    pub fn new(
        role: SocketRole,
        addr: String,
        request_timeout: Duration,
        liveness_timeout: Duration,
    ) -> Self {
        Self {
            role,
            addr,
            request_timeout,
            liveness_timeout,
            live: None,
            topics: Arc::new(RwLock::new(HashSet::new())),
            last_rx: Arc::new(Mutex::new(Instant::now())),
            last_tx: Instant::now(),
            request_outstanding: false,
            peeked: None,
        }
    }

    fn spawn_reader(
        role: SocketRole,
        mut framed: FramedRead<OwnedReadHalf, MessageCodec>,
        tx: mpsc::Sender<Message>,
        last_rx: Arc<Mutex<Instant>>,
        topics: Arc<RwLock<HashSet<String>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(next) = framed.next().await {
                let message = match next {
                    Ok(message) => message,
                    // A frame that does not decode is dropped; the stream
                    // itself is still framed correctly.
                    Err(AgentError::Codec(e)) => {
                        error!("Dropping malformed message on socket {}: {}", role, e);
                        continue;
                    }
                    Err(e) => {
                        debug!("Socket {} read error: {}", role, e);
                        break;
                    }
                };
                *last_rx.lock() = Instant::now();

                // SUB filtering happens here, before the frame reaches the
                // event loop, keyed on the endpoint id the publication names.
                if role == SocketRole::AclSub {
                    if let Message::AclUpdate(update) = &message {
                        if !topics.read().contains(&update.endpoint_id) {
                            continue;
                        }
                    }
                }

                if tx.send(message).await.is_err() {
                    break;
                }
            }
            debug!("Socket {} reader finished", role);
        })
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn role(&self) -> SocketRole {
        self.role
    }

    async fn communicate(&mut self, hostname: &str) -> Result<(), AgentError> {
        self.close().await;

        let stream = time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                AgentError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.addr),
                ))
            })??;
        let (read_half, write_half) = stream.into_split();

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = Self::spawn_reader(
            self.role,
            FramedRead::new(read_half, MessageCodec::new()),
            tx,
            Arc::clone(&self.last_rx),
            Arc::clone(&self.topics),
        );

        self.live = Some(Live {
            writer: FramedWrite::new(write_half, MessageCodec::new()),
            inbound,
            reader,
        });
        *self.last_rx.lock() = Instant::now();
        self.last_tx = Instant::now();
        self.request_outstanding = false;

        info!("Socket {} connected to {} as {}", self.role, self.addr, hostname);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(live) = self.live.take() {
            live.reader.abort();
        }
        self.peeked = None;
        self.request_outstanding = false;
    }

    async fn send(&mut self, message: Message) -> Result<(), AgentError> {
        let Some(live) = self.live.as_mut() else {
            return Err(AgentError::NotConnected(self.role));
        };
        live.writer.send(message).await?;
        self.last_tx = Instant::now();
        if self.role.is_request() {
            self.request_outstanding = true;
        }
        Ok(())
    }

    fn receive(&mut self) -> Option<Message> {
        let message = self.peeked.take().or_else(|| {
            self.live
                .as_mut()
                .and_then(|live| live.inbound.try_recv().ok())
        })?;
        if self.role.is_request() {
            self.request_outstanding = false;
        }
        Some(message)
    }

    async fn wait_readable(&mut self) {
        if self.has_pending() {
            return;
        }
        match self.live.as_mut() {
            Some(live) => match live.inbound.recv().await {
                Some(message) => self.peeked = Some(message),
                // Reader gone; stay quiet until the timeout sweep reconnects.
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    fn has_pending(&self) -> bool {
        self.peeked.is_some()
            || self
                .live
                .as_ref()
                .is_some_and(|live| !live.inbound.is_empty())
    }

    fn request_outstanding(&self) -> bool {
        self.request_outstanding
    }

    fn timed_out(&self, now: Instant) -> bool {
        if self.live.is_none() {
            return true;
        }
        if self.role.is_request() {
            self.request_outstanding
                && now.saturating_duration_since(self.last_tx) > self.request_timeout
        } else {
            now.saturating_duration_since(*self.last_rx.lock()) > self.liveness_timeout
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), AgentError> {
        if self.role != SocketRole::AclSub {
            return Err(AgentError::Unsupported(self.role));
        }
        self.topics.write().insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), AgentError> {
        if self.role != SocketRole::AclSub {
            return Err(AgentError::Unsupported(self.role));
        }
        self.topics.write().remove(topic);
        Ok(())
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.read().iter().cloned().collect();
        topics.sort();
        topics
    }
}
