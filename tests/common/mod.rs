#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use d_raft::proto::ApplyMsg;
use d_raft::proto::Entry;
use d_raft::LocalNetwork;
use d_raft::MemStateStorage;
use d_raft::NodeId;
use d_raft::Raft;
use d_raft::RaftNodeConfig;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound of the randomized election timeout (default settings)
pub const ELECTION_TIMEOUT_MAX_MS: u64 = 300;

/// How long `check_one_leader` waits between two polls
const LEADER_POLL_MS: u64 = 500;

pub fn node_config(
    node_id: NodeId,
    cluster: &[NodeId],
) -> RaftNodeConfig {
    let mut settings = RaftNodeConfig::default();
    settings.cluster.node_id = node_id;
    settings.cluster.initial_cluster = cluster.to_vec();
    settings
}

#[derive(Default)]
struct ApplyLog {
    /// Commands seen on the apply channel, per peer and index
    logs: HashMap<NodeId, BTreeMap<u64, Vec<u8>>>,
    errors: Vec<String>,
}

/// In-process cluster over a [`LocalNetwork`], one [`MemStateStorage`] per
/// peer. Every apply channel is drained into a shared log that checks order
/// and agreement across peers.
pub struct TestCluster {
    pub network: LocalNetwork,
    ids: Vec<NodeId>,
    rafts: HashMap<NodeId, Raft>,
    storages: HashMap<NodeId, MemStateStorage>,
    applied: Arc<Mutex<ApplyLog>>,
    collectors: Vec<JoinHandle<()>>,
}

impl TestCluster {
    pub fn new(size: u32) -> Self {
        let mut cluster = Self {
            network: LocalNetwork::new(),
            ids: (1..=size).collect(),
            rafts: HashMap::new(),
            storages: HashMap::new(),
            applied: Arc::new(Mutex::new(ApplyLog::default())),
            collectors: Vec::new(),
        };
        for id in cluster.ids.clone() {
            cluster.start(id);
        }
        cluster
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn raft(
        &self,
        id: NodeId,
    ) -> &Raft {
        self.rafts.get(&id).expect("peer is running")
    }

    pub fn storage(
        &self,
        id: NodeId,
    ) -> MemStateStorage {
        self.storages.get(&id).cloned().unwrap_or_default()
    }

    /// Starts (or restarts) `id` over whatever its storage holds.
    pub fn start(
        &mut self,
        id: NodeId,
    ) {
        let storage = self.storages.entry(id).or_default().clone();
        let (apply_tx, apply_rx) = mpsc::channel(128);
        let raft = Raft::make(
            Arc::new(node_config(id, &self.ids)),
            self.ids.clone(),
            id,
            self.network.transport(id),
            Arc::new(storage),
            apply_tx,
        )
        .expect("peer should start");
        self.network.register(&raft);
        self.collectors
            .push(tokio::spawn(collect_applies(id, apply_rx, self.applied.clone())));
        self.rafts.insert(id, raft);
    }

    /// Kills `id`. Its storage is detached so the dead instance can no
    /// longer write to what a restarted one reads.
    pub fn crash(
        &mut self,
        id: NodeId,
    ) {
        debug!(id, "crash");
        if let Some(raft) = self.rafts.remove(&id) {
            raft.kill();
        }
        self.network.unregister(id);
        if let Some(storage) = self.storages.get(&id) {
            let copy = storage.snapshot_copy();
            self.storages.insert(id, copy);
        }
    }

    pub fn disconnect(
        &self,
        id: NodeId,
    ) {
        self.network.disconnect(id);
    }

    pub fn connect(
        &self,
        id: NodeId,
    ) {
        self.network.connect(id);
    }

    fn connected_rafts(&self) -> impl Iterator<Item = (&NodeId, &Raft)> {
        self.rafts
            .iter()
            .filter(|(id, _)| self.network.is_connected(**id))
    }

    /// Waits for exactly one leader among the connected peers and returns
    /// it. Panics if any term has two leaders.
    pub async fn check_one_leader(&self) -> NodeId {
        for _ in 0..10 {
            sleep(Duration::from_millis(LEADER_POLL_MS)).await;

            let mut leaders: HashMap<u64, Vec<NodeId>> = HashMap::new();
            for (id, raft) in self.connected_rafts() {
                let (term, is_leader) = raft.get_state();
                if is_leader {
                    leaders.entry(term).or_default().push(*id);
                }
            }

            for (term, ids) in &leaders {
                assert!(ids.len() <= 1, "term {term} has {} leaders: {ids:?}", ids.len());
            }
            if let Some(last_term) = leaders.keys().max() {
                return leaders[last_term][0];
            }
        }
        panic!("expected one leader, got none");
    }

    /// Term every connected peer agrees on.
    pub fn check_terms(&self) -> u64 {
        let mut term = None;
        for (id, raft) in self.connected_rafts() {
            let (t, _) = raft.get_state();
            match term {
                None => term = Some(t),
                Some(existing) => assert_eq!(existing, t, "peer {id} disagrees on term"),
            }
        }
        term.expect("at least one connected peer")
    }

    pub fn check_no_leader(&self) {
        for (id, raft) in self.connected_rafts() {
            assert!(!raft.get_state().1, "peer {id} is leader but should not be");
        }
    }

    /// How many peers applied `index`, and the command they agree on.
    pub fn n_committed(
        &self,
        index: u64,
    ) -> (usize, Option<Vec<u8>>) {
        let applied = self.applied.lock();
        assert!(applied.errors.is_empty(), "apply errors: {:?}", applied.errors);

        let mut count = 0;
        let mut command: Option<Vec<u8>> = None;
        for log in applied.logs.values() {
            if let Some(c) = log.get(&index) {
                if let Some(existing) = &command {
                    assert_eq!(existing, c, "committed values differ at index {index}");
                }
                count += 1;
                command = Some(c.clone());
            }
        }
        (count, command)
    }

    /// Applied commands of `id`, in index order.
    pub fn applied_by(
        &self,
        id: NodeId,
    ) -> Vec<(u64, Vec<u8>)> {
        self.applied
            .lock()
            .logs
            .get(&id)
            .map(|log| log.iter().map(|(i, c)| (*i, c.clone())).collect())
            .unwrap_or_default()
    }

    pub fn log_of(
        &self,
        id: NodeId,
    ) -> Vec<Entry> {
        self.raft(id).log_entries()
    }

    /// Proposes `cmd` on whichever connected peer leads and waits until at
    /// least `expected` peers applied it. Returns its index.
    ///
    /// With `retry` a failed round tries again (a leader may lose its
    /// position before the entry commits); without it, one failed round
    /// panics.
    pub async fn one(
        &self,
        cmd: &[u8],
        expected: usize,
        retry: bool,
    ) -> u64 {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut cursor = 0;
        while Instant::now() < deadline {
            let mut proposed = None;
            for _ in 0..self.ids.len() {
                cursor = (cursor + 1) % self.ids.len();
                let id = self.ids[cursor];
                if !self.network.is_connected(id) {
                    continue;
                }
                if let Some(raft) = self.rafts.get(&id) {
                    if let Ok((index, _, true)) = raft.start(cmd.to_vec()) {
                        proposed = Some(index);
                        break;
                    }
                }
            }

            match proposed {
                Some(index) => {
                    let wait_until = Instant::now() + Duration::from_secs(2);
                    while Instant::now() < wait_until {
                        let (n, committed) = self.n_committed(index);
                        if n >= expected && committed.as_deref() == Some(cmd) {
                            return index;
                        }
                        sleep(Duration::from_millis(20)).await;
                    }
                    assert!(retry, "one({:?}) failed to reach agreement", String::from_utf8_lossy(cmd));
                }
                None => sleep(Duration::from_millis(50)).await,
            }
        }
        panic!("one({:?}) failed to reach agreement", String::from_utf8_lossy(cmd));
    }

    pub fn shutdown(self) {
        for raft in self.rafts.values() {
            raft.kill();
        }
        for collector in self.collectors {
            collector.abort();
        }
    }
}

async fn collect_applies(
    id: NodeId,
    mut apply_rx: mpsc::Receiver<ApplyMsg>,
    applied: Arc<Mutex<ApplyLog>>,
) {
    // Every incarnation starts over at index 1
    let mut expected = 1;
    while let Some(msg) = apply_rx.recv().await {
        let mut guard = applied.lock();
        let state = &mut *guard;

        if msg.index != expected {
            state
                .errors
                .push(format!("peer {id} applied {} out of order, expected {expected}", msg.index));
        }
        expected = msg.index + 1;

        for (other, log) in &state.logs {
            if let Some(command) = log.get(&msg.index) {
                if *command != msg.command {
                    state.errors.push(format!(
                        "peer {id} applied {:?} at {} but peer {other} applied {:?}",
                        msg.command, msg.index, command
                    ));
                }
            }
        }
        state.logs.entry(id).or_default().insert(msg.index, msg.command);
    }
}
