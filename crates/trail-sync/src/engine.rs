use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use trail_ledger::{Ledger, Record};
use trail_protocol::Message;
use trail_types::Payload;

use crate::error::{SyncError, SyncResult};
use crate::link::{spawn_io, LinkDirection, LinkHandle, LinkId, LinkState, Outbox, PeerInfo};
use crate::recent::RecentDigests;
use crate::transport::{parse_seed, LinkStream, Transport};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Tunables for a [`ReplicationEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How many accepted record digests to remember for duplicate suppression.
    pub recent_digest_capacity: usize,
    /// Messages queued per link before the peer counts as stalled and the
    /// link is closed.
    pub outbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recent_digest_capacity: 1024,
            outbox_capacity: 64,
        }
    }
}

/// Owns the local ledger and every peer link.
///
/// Handlers run on the link reader tasks and may run concurrently. The
/// ledger lock is always taken before the link table lock, never the
/// other way round, and neither is held across an await.
pub struct ReplicationEngine {
    ledger: RwLock<Ledger>,
    links: RwLock<HashMap<LinkId, LinkHandle>>,
    recent: Mutex<RecentDigests>,
    next_link: AtomicU64,
    outbox_capacity: usize,
}

impl ReplicationEngine {
    /// An engine holding a fresh genesis-only ledger.
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_ledger(Ledger::new(), config)
    }

    pub fn with_ledger(ledger: Ledger, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            ledger: RwLock::new(ledger),
            links: RwLock::new(HashMap::new()),
            recent: Mutex::new(RecentDigests::new(config.recent_digest_capacity)),
            next_link: AtomicU64::new(1),
            outbox_capacity: config.outbox_capacity.max(1),
        })
    }

    // -- local operations ---------------------------------------------------

    /// Append a record carrying `payload` and announce it to every open link.
    pub fn mint(&self, payload: Payload) -> Record {
        let mut ledger = self.write_ledger();
        let record = ledger.append(payload);
        self.recent().insert(record.digest());
        info!(seq = record.sequence(), digest = %record.digest().short_hex(), "record minted");
        self.broadcast(None, &Message::NewRecord(record.clone()));
        record
    }

    /// A copy of the current chain.
    pub fn records(&self) -> Vec<Record> {
        self.read_ledger().snapshot()
    }

    pub fn ledger_len(&self) -> usize {
        self.read_ledger().len()
    }

    pub fn is_valid(&self) -> bool {
        self.read_ledger().validate()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let links = self.read_links();
        let mut peers: Vec<PeerInfo> = links.iter().map(|(id, h)| h.info(*id)).collect();
        peers.sort_by_key(|p| p.id);
        peers
    }

    pub fn open_link_count(&self) -> usize {
        self.read_links().values().filter(|h| h.state.is_open()).count()
    }

    // -- links --------------------------------------------------------------

    /// Accept inbound connections. Accept errors are logged and retried.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> SyncResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "listening for peers");
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%remote, error = %e, "could not disable Nagle");
                    }
                    self.attach(stream, remote.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Register an inbound stream as an open link and request the peer's chain.
    pub fn attach<S: LinkStream>(self: &Arc<Self>, stream: S, remote: impl Into<String>) -> LinkId {
        let (id, outbox) = self.register(remote.into(), LinkDirection::Inbound, LinkState::Open);
        self.start(id, stream, outbox);
        id
    }

    /// Open an outbound link to `addr`.
    ///
    /// The link is listed as connecting while the transport dials. On
    /// failure it is closed and dropped from the table.
    pub async fn connect<T: Transport>(self: &Arc<Self>, transport: &T, addr: &str) -> SyncResult<LinkId> {
        let (id, outbox) = self.register(addr.to_string(), LinkDirection::Outbound, LinkState::Connecting);
        match transport.connect(addr).await {
            Ok(stream) => {
                self.transition(id, LinkState::Open)?;
                info!(link = %id, addr, "connected to peer");
                self.start(id, stream, outbox);
                Ok(id)
            }
            Err(e) => {
                warn!(link = %id, addr, error = %e, "connection failed");
                self.close_link(id);
                Err(e)
            }
        }
    }

    /// Connect to the configured seed peer, if any.
    ///
    /// A missing, malformed, or unreachable seed is logged and otherwise
    /// ignored; the node keeps running alone.
    pub async fn connect_seed<T: Transport>(self: &Arc<Self>, transport: &T, seed: Option<&str>) -> Option<LinkId> {
        let Some(raw) = seed.filter(|s| !s.trim().is_empty()) else {
            info!("no seed peer configured");
            return None;
        };
        let addr = match parse_seed(raw) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "ignoring seed peer");
                return None;
            }
        };
        self.connect(transport, &addr).await.ok()
    }

    /// Close a link and drop it from the table. Idempotent.
    pub fn close_link(&self, id: LinkId) {
        let removed = self.write_links().remove(&id);
        if let Some(mut handle) = removed {
            if let Err(e) = handle.state.transition(LinkState::Closed) {
                debug!(link = %id, error = %e, "link already closed");
            }
            if let Some(reader) = handle.reader.take() {
                reader.abort();
            }
            info!(link = %id, remote = %handle.remote, "link closed");
        }
    }

    /// Queue `msg` on one link.
    ///
    /// Never waits. If the link's outbox is full the link is closed.
    pub fn send_to(&self, id: LinkId, msg: Message) -> SyncResult<()> {
        let offered = {
            let links = self.read_links();
            let handle = links
                .get(&id)
                .filter(|h| h.state.is_open())
                .ok_or(SyncError::LinkClosed(id))?;
            handle.offer(msg)
        };
        match offered {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(link = %id, "outbox full, closing link");
                self.close_link(id);
                Err(SyncError::Backlogged(id))
            }
            Err(TrySendError::Closed(_)) => {
                self.close_link(id);
                Err(SyncError::LinkClosed(id))
            }
        }
    }

    // -- message handling ---------------------------------------------------

    /// React to one message received on link `from`.
    pub fn handle_message(&self, from: LinkId, msg: Message) {
        match msg {
            Message::GetLedger => self.reply_with_snapshot(from),
            Message::LedgerSnapshot(records) => self.reconcile(from, records),
            Message::NewRecord(record) => self.accept_record(from, record),
        }
    }

    /// Queue our chain on `to` unless a snapshot is already waiting there.
    ///
    /// A queued snapshot already answers every request made before the
    /// writer picks it up, so repeated requests cost one copy of the chain.
    fn reply_with_snapshot(&self, to: LinkId) {
        let Some(pending) = self.read_links().get(&to).map(|h| Arc::clone(&h.snapshot_pending)) else {
            debug!(link = %to, "snapshot request from closed link");
            return;
        };
        if pending.swap(true, Ordering::AcqRel) {
            debug!(link = %to, "snapshot already queued");
            return;
        }
        let snapshot = self.records();
        if let Err(e) = self.send_to(to, Message::LedgerSnapshot(snapshot)) {
            pending.store(false, Ordering::Release);
            debug!(link = %to, error = %e, "snapshot reply dropped");
        }
    }

    fn reconcile(&self, from: LinkId, records: Vec<Record>) {
        let offered = records.len();
        let mut ledger = self.write_ledger();
        if ledger.replace_if_better(records) {
            info!(link = %from, len = offered, "adopted longer chain from peer");
        } else {
            debug!(link = %from, offered, local = ledger.len(), "kept local chain");
        }
    }

    fn accept_record(&self, from: LinkId, record: Record) {
        let digest = record.digest();
        if self.recent().contains(&digest) {
            debug!(link = %from, digest = %digest.short_hex(), "duplicate record ignored");
            return;
        }

        let mut ledger = self.write_ledger();
        match ledger.accept_tail(record.clone()) {
            Ok(()) => {
                self.recent().insert(digest);
                info!(link = %from, seq = record.sequence(), digest = %digest.short_hex(), "record accepted");
                self.broadcast(Some(from), &Message::NewRecord(record));
            }
            Err(e) => {
                debug!(link = %from, seq = record.sequence(), error = %e, "record rejected");
            }
        }
    }

    /// Queue `msg` on every open link except `except`.
    ///
    /// Links whose outbox is full or whose writer is gone are closed.
    fn broadcast(&self, except: Option<LinkId>, msg: &Message) {
        let mut dead = Vec::new();
        {
            let links = self.read_links();
            for (id, handle) in links.iter() {
                if Some(*id) == except || !handle.state.is_open() {
                    continue;
                }
                match handle.offer(msg.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(link = %id, "outbox full, closing link");
                        dead.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }
        for id in dead {
            self.close_link(id);
        }
    }

    // -- internals ----------------------------------------------------------

    pub(crate) fn register(
        &self,
        remote: String,
        direction: LinkDirection,
        state: LinkState,
    ) -> (LinkId, Outbox) {
        let id = LinkId(self.next_link.fetch_add(1, Ordering::Relaxed));
        let (outbox, rx) = mpsc::channel(self.outbox_capacity);
        let snapshot_pending = Arc::new(AtomicBool::new(false));
        let handle = LinkHandle {
            remote,
            direction,
            state,
            outbox,
            snapshot_pending: Arc::clone(&snapshot_pending),
            reader: None,
        };
        self.write_links().insert(id, handle);
        debug!(link = %id, ?direction, "link registered");
        (id, Outbox::new(rx, snapshot_pending))
    }

    fn transition(&self, id: LinkId, next: LinkState) -> SyncResult<()> {
        let mut links = self.write_links();
        let handle = links.get_mut(&id).ok_or(SyncError::LinkClosed(id))?;
        handle.state.transition(next)
    }

    fn start<S: LinkStream>(self: &Arc<Self>, id: LinkId, stream: S, outbox: Outbox) {
        if let Err(e) = self.send_to(id, Message::GetLedger) {
            debug!(link = %id, error = %e, "initial ledger request dropped");
        }
        let reader = spawn_io(Arc::clone(self), id, stream, outbox);
        let mut links = self.write_links();
        match links.get_mut(&id) {
            Some(handle) => handle.reader = Some(reader),
            None => reader.abort(),
        }
    }

    fn read_ledger(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ledger(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_links(&self) -> RwLockReadGuard<'_, HashMap<LinkId, LinkHandle>> {
        self.links.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_links(&self) -> RwLockWriteGuard<'_, HashMap<LinkId, LinkHandle>> {
        self.links.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn recent(&self) -> MutexGuard<'_, RecentDigests> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use trail_types::Timestamp;

    use super::*;

    fn engine() -> Arc<ReplicationEngine> {
        ReplicationEngine::new(EngineConfig::default())
    }

    fn engine_with(n: usize) -> Arc<ReplicationEngine> {
        let mut ledger = Ledger::new();
        for i in 0..n {
            ledger.append_at(Payload::from(format!("r{i}")), Timestamp::from_millis(10 + i as u64));
        }
        ReplicationEngine::with_ledger(ledger, EngineConfig::default())
    }

    fn open_link(engine: &ReplicationEngine) -> (LinkId, Outbox) {
        engine.register("test".into(), LinkDirection::Inbound, LinkState::Open)
    }

    fn drain(rx: &mut Outbox) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn get_ledger_replies_on_same_link_only() {
        let node = engine_with(2);
        let (asker, mut asker_rx) = open_link(&node);
        let (_other, mut other_rx) = open_link(&node);

        node.handle_message(asker, Message::GetLedger);

        assert_eq!(drain(&mut asker_rx), vec![Message::LedgerSnapshot(node.records())]);
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn longer_snapshot_is_adopted_silently() {
        let node = engine();
        let (from, mut from_rx) = open_link(&node);
        let (_other, mut other_rx) = open_link(&node);
        let longer = engine_with(3).records();

        node.handle_message(from, Message::LedgerSnapshot(longer.clone()));

        assert_eq!(node.records(), longer);
        assert!(drain(&mut from_rx).is_empty());
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn shorter_or_equal_snapshot_is_ignored() {
        let node = engine_with(3);
        let before = node.records();
        let (from, _rx) = open_link(&node);

        node.handle_message(from, Message::LedgerSnapshot(engine_with(1).records()));
        node.handle_message(from, Message::LedgerSnapshot(engine_with(3).records()));
        assert_eq!(node.records(), before);
    }

    #[test]
    fn new_record_is_linked_and_rebroadcast_except_to_sender() {
        let source = engine_with(1);
        let node = engine_with(1);
        let (sender, mut sender_rx) = open_link(&node);
        let (_a, mut a_rx) = open_link(&node);
        let (_b, mut b_rx) = open_link(&node);

        let record = source.mint("fresh".into());
        node.handle_message(sender, Message::NewRecord(record.clone()));

        assert_eq!(node.ledger_len(), 3);
        assert!(drain(&mut sender_rx).is_empty());
        assert_eq!(drain(&mut a_rx), vec![Message::NewRecord(record.clone())]);
        assert_eq!(drain(&mut b_rx), vec![Message::NewRecord(record)]);
    }

    #[test]
    fn non_extending_record_is_dropped() {
        let node = engine_with(2);
        let (sender, _sender_rx) = open_link(&node);
        let (_other, mut other_rx) = open_link(&node);
        let stray = engine_with(5).records()[4].clone();

        node.handle_message(sender, Message::NewRecord(stray));

        assert_eq!(node.ledger_len(), 3);
        assert!(node.is_valid());
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn duplicate_record_is_forwarded_once() {
        let source = engine();
        let node = engine();
        let (first, _first_rx) = open_link(&node);
        let (second, _second_rx) = open_link(&node);
        let (_third, mut third_rx) = open_link(&node);

        let record = source.mint("once".into());
        node.handle_message(first, Message::NewRecord(record.clone()));
        node.handle_message(second, Message::NewRecord(record));

        assert_eq!(node.ledger_len(), 2);
        assert_eq!(drain(&mut third_rx).len(), 1);
    }

    #[test]
    fn mint_reaches_open_links_but_not_connecting_ones() {
        let node = engine();
        let (_open, mut open_rx) = open_link(&node);
        let (_dialing, mut dialing_rx) =
            node.register("dialing".into(), LinkDirection::Outbound, LinkState::Connecting);

        let record = node.mint("hello".into());

        assert_eq!(record.sequence(), 1);
        assert_eq!(drain(&mut open_rx), vec![Message::NewRecord(record)]);
        assert!(drain(&mut dialing_rx).is_empty());
    }

    #[test]
    fn concurrent_mints_diverge_then_reconcile() {
        let a = engine();
        let b = engine();
        let (a_from_b, _a_rx) = open_link(&a);
        let (b_from_a, _b_rx) = open_link(&b);

        let ra = a.mint("from a".into());
        let rb = b.mint("from b".into());
        a.handle_message(a_from_b, Message::NewRecord(rb));
        b.handle_message(b_from_a, Message::NewRecord(ra));

        // Both tails are at sequence 1; neither accepts the other's record.
        assert_eq!(a.ledger_len(), 2);
        assert_eq!(b.ledger_len(), 2);
        assert!(a.is_valid() && b.is_valid());
        assert_ne!(a.records(), b.records());

        // Equal length snapshots change nothing.
        b.handle_message(b_from_a, Message::LedgerSnapshot(a.records()));
        assert_ne!(a.records(), b.records());

        // The next mint breaks the tie.
        a.mint("tiebreak".into());
        b.handle_message(b_from_a, Message::LedgerSnapshot(a.records()));
        assert_eq!(a.records(), b.records());
    }

    #[test]
    fn close_link_is_idempotent_and_stops_delivery() {
        let node = engine();
        let (id, mut rx) = open_link(&node);
        assert_eq!(node.open_link_count(), 1);

        node.close_link(id);
        node.close_link(id);

        assert!(node.peers().is_empty());
        assert!(matches!(node.send_to(id, Message::GetLedger), Err(SyncError::LinkClosed(_))));
        node.mint("after close".into());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn dropped_receiver_closes_link_on_broadcast() {
        let node = engine();
        let (_id, rx) = open_link(&node);
        drop(rx);

        node.mint("nobody listening".into());
        assert_eq!(node.open_link_count(), 0);
    }

    #[test]
    fn repeated_ledger_requests_queue_one_snapshot() {
        let node = engine_with(2);
        let (asker, mut asker_rx) = open_link(&node);

        for _ in 0..10 {
            node.handle_message(asker, Message::GetLedger);
        }
        assert_eq!(drain(&mut asker_rx), vec![Message::LedgerSnapshot(node.records())]);

        // Once the writer has taken it, the next request is answered again.
        node.mint("later".into());
        node.handle_message(asker, Message::GetLedger);
        let sent = drain(&mut asker_rx);
        assert_eq!(sent.last(), Some(&Message::LedgerSnapshot(node.records())));
        assert_eq!(node.open_link_count(), 1);
    }

    #[test]
    fn stalled_link_is_closed_when_outbox_fills() {
        let config = EngineConfig {
            outbox_capacity: 4,
            ..EngineConfig::default()
        };
        let node = ReplicationEngine::new(config);
        let (stalled, _stalled_rx) = open_link(&node);
        let (_live, mut live_rx) = open_link(&node);

        for i in 0..6 {
            node.mint(Payload::from(format!("m{i}")));
            drain(&mut live_rx);
        }

        assert_eq!(node.ledger_len(), 7);
        assert_eq!(node.open_link_count(), 1);
        assert!(node.peers().iter().all(|p| p.id != stalled));
        assert!(matches!(node.send_to(stalled, Message::GetLedger), Err(SyncError::LinkClosed(_))));
    }

    #[test]
    fn full_outbox_on_reply_closes_link() {
        let config = EngineConfig {
            outbox_capacity: 1,
            ..EngineConfig::default()
        };
        let node = ReplicationEngine::new(config);
        let (id, _rx) = open_link(&node);

        node.send_to(id, Message::GetLedger).unwrap();
        let err = node.send_to(id, Message::GetLedger).unwrap_err();

        assert!(matches!(err, SyncError::Backlogged(_)));
        assert!(node.peers().is_empty());
    }

    #[test]
    fn peers_are_listed_in_id_order() {
        let node = engine();
        let (a, _a_rx) = open_link(&node);
        let (b, _b_rx) = node.register("seed:6001".into(), LinkDirection::Outbound, LinkState::Connecting);

        let peers = node.peers();
        assert_eq!(peers.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(peers[1].state, LinkState::Connecting);
        assert_eq!(node.open_link_count(), 1);
    }
}
