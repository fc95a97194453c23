use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use trail_protocol::{Decoded, Message, TrailCodec};

use crate::engine::ReplicationEngine;
use crate::error::{SyncError, SyncResult};
use crate::transport::LinkStream;

/// Process-unique identifier of one peer link.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
#[serde(transparent)]
pub struct LinkId(pub(crate) u64);

impl LinkId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Who opened the link.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inbound,
    Outbound,
}

/// Lifecycle of a peer link.
///
/// ```text
/// Connecting ──► Open ──► Closed
///      └──────────────────► Closed
/// ```
///
/// Only outbound links pass through `Connecting`. `Closed` is terminal.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

impl LinkState {
    pub fn can_transition_to(self, next: LinkState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open) | (Self::Connecting, Self::Closed) | (Self::Open, Self::Closed)
        )
    }

    pub fn transition(&mut self, next: LinkState) -> SyncResult<()> {
        if !self.can_transition_to(next) {
            return Err(SyncError::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Public view of a link, for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub id: LinkId,
    pub remote: String,
    pub direction: LinkDirection,
    pub state: LinkState,
}

/// Engine-side entry for one link.
///
/// Dropping the handle drops the outbox sender, which ends the writer
/// task and shuts the write half of the stream.
pub(crate) struct LinkHandle {
    pub(crate) remote: String,
    pub(crate) direction: LinkDirection,
    pub(crate) state: LinkState,
    pub(crate) outbox: mpsc::Sender<Message>,
    /// Set while a full snapshot sits in the outbox, cleared by the writer.
    pub(crate) snapshot_pending: Arc<AtomicBool>,
    pub(crate) reader: Option<tokio::task::AbortHandle>,
}

impl LinkHandle {
    pub(crate) fn info(&self, id: LinkId) -> PeerInfo {
        PeerInfo {
            id,
            remote: self.remote.clone(),
            direction: self.direction,
            state: self.state,
        }
    }

    /// Queue without waiting. A full outbox means the peer is not keeping up.
    pub(crate) fn offer(&self, msg: Message) -> Result<(), TrySendError<Message>> {
        self.outbox.try_send(msg)
    }
}

/// Receiving end of a link's outbox, owned by the writer task.
pub(crate) struct Outbox {
    rx: mpsc::Receiver<Message>,
    snapshot_pending: Arc<AtomicBool>,
}

impl Outbox {
    pub(crate) fn new(rx: mpsc::Receiver<Message>, snapshot_pending: Arc<AtomicBool>) -> Self {
        Self { rx, snapshot_pending }
    }

    pub(crate) async fn recv(&mut self) -> Option<Message> {
        let msg = self.rx.recv().await?;
        Some(self.dequeued(msg))
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Message> {
        let msg = self.rx.try_recv().ok()?;
        Some(self.dequeued(msg))
    }

    fn dequeued(&self, msg: Message) -> Message {
        if matches!(msg, Message::LedgerSnapshot(_)) {
            self.snapshot_pending.store(false, Ordering::Release);
        }
        msg
    }
}

/// Start the reader and writer tasks for an open link.
///
/// Returns the abort handle of the reader so the engine can stop it when
/// the link is closed from the other side.
pub(crate) fn spawn_io<S: LinkStream>(
    engine: Arc<ReplicationEngine>,
    id: LinkId,
    stream: S,
    outbox: Outbox,
) -> tokio::task::AbortHandle {
    let (reader, writer) = tokio::io::split(stream);
    tokio::spawn(write_loop(Arc::clone(&engine), id, writer, outbox));
    tokio::spawn(read_loop(engine, id, reader)).abort_handle()
}

async fn write_loop<S: LinkStream>(
    engine: Arc<ReplicationEngine>,
    id: LinkId,
    mut writer: WriteHalf<S>,
    mut outbox: Outbox,
) {
    while let Some(msg) = outbox.recv().await {
        // A message that cannot be framed is dropped; the link stays up.
        let frame = match TrailCodec::encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(link = %id, kind = msg.type_name(), error = %e, "message not sent");
                continue;
            }
        };
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(link = %id, error = %e, "write failed");
            engine.close_link(id);
            break;
        }
        debug!(link = %id, kind = msg.type_name(), bytes = frame.len(), "message sent");
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<S: LinkStream>(engine: Arc<ReplicationEngine>, id: LinkId, mut reader: ReadHalf<S>) {
    loop {
        match TrailCodec::read_frame(&mut reader).await {
            Ok(Some(Decoded::Message(msg))) => {
                debug!(link = %id, kind = msg.type_name(), "message received");
                engine.handle_message(id, msg);
            }
            Ok(Some(Decoded::Unknown(kind))) => {
                warn!(link = %id, kind = %kind, "unknown message type ignored");
            }
            Ok(None) => {
                info!(link = %id, "peer closed the link");
                break;
            }
            Err(e) => {
                warn!(link = %id, error = %e, "unreadable frame, closing link");
                break;
            }
        }
    }
    engine.close_link(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_lifecycle() {
        let mut state = LinkState::Connecting;
        state.transition(LinkState::Open).unwrap();
        assert!(state.is_open());
        state.transition(LinkState::Closed).unwrap();
        assert_eq!(state, LinkState::Closed);
    }

    #[test]
    fn connect_failure_goes_straight_to_closed() {
        let mut state = LinkState::Connecting;
        state.transition(LinkState::Closed).unwrap();
        assert!(!state.is_open());
    }

    #[test]
    fn closed_is_terminal() {
        let mut state = LinkState::Closed;
        for next in [LinkState::Connecting, LinkState::Open, LinkState::Closed] {
            let err = state.transition(next).unwrap_err();
            assert!(matches!(err, SyncError::InvalidTransition { from: LinkState::Closed, .. }));
        }
        assert_eq!(state, LinkState::Closed);
    }

    #[test]
    fn open_cannot_reconnect() {
        assert!(!LinkState::Open.can_transition_to(LinkState::Connecting));
        assert!(!LinkState::Open.can_transition_to(LinkState::Open));
    }

    #[tokio::test]
    async fn writer_taking_a_snapshot_clears_pending_flag() {
        let (tx, rx) = mpsc::channel(4);
        let pending = Arc::new(AtomicBool::new(true));
        let mut outbox = Outbox::new(rx, Arc::clone(&pending));

        tx.send(Message::GetLedger).await.unwrap();
        tx.send(Message::LedgerSnapshot(Vec::new())).await.unwrap();

        assert_eq!(outbox.recv().await, Some(Message::GetLedger));
        assert!(pending.load(Ordering::Acquire));
        assert_eq!(outbox.recv().await, Some(Message::LedgerSnapshot(Vec::new())));
        assert!(!pending.load(Ordering::Acquire));
    }

    #[test]
    fn link_id_display() {
        assert_eq!(LinkId(7).to_string(), "link#7");
    }

    #[test]
    fn peer_info_serializes_lowercase_enums() {
        let info = PeerInfo {
            id: LinkId(1),
            remote: "127.0.0.1:6001".into(),
            direction: LinkDirection::Outbound,
            state: LinkState::Open,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["direction"], "outbound");
        assert_eq!(value["state"], "open");
    }
}
