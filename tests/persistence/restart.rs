//! Peers resume from their persisted term, vote and log.

use crate::common::TestCluster;

#[tokio::test(start_paused = true)]
async fn test_restart_restores_persisted_state() {
    let mut cluster = TestCluster::new(3);
    cluster.one(b"before", 3, false).await;

    let ids = cluster.ids().to_vec();
    let saved: Vec<_> = ids
        .iter()
        .map(|id| {
            let raft = cluster.raft(*id);
            (raft.current_term(), raft.voted_for(), raft.log_entries())
        })
        .collect();

    for id in &ids {
        cluster.crash(*id);
    }
    for id in &ids {
        cluster.start(*id);
    }

    for (id, (term, voted_for, log)) in ids.iter().zip(saved) {
        let raft = cluster.raft(*id);
        assert_eq!(raft.current_term(), term);
        assert_eq!(raft.voted_for(), voted_for);
        assert_eq!(raft.log_entries(), log);
        assert_eq!(raft.commit_index(), 0);
    }

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_persist_after_full_restart() {
    let mut cluster = TestCluster::new(3);
    assert_eq!(cluster.one(b"11", 3, false).await, 1);
    let leader = cluster.check_one_leader().await;
    let (term_before, _) = cluster.raft(leader).get_state();

    let ids = cluster.ids().to_vec();
    for id in &ids {
        cluster.crash(*id);
    }
    for id in &ids {
        cluster.start(*id);
    }

    let index = cluster.one(b"12", 3, true).await;
    assert_eq!(index, 2);
    let leader = cluster.check_one_leader().await;
    let (term_after, _) = cluster.raft(leader).get_state();
    assert!(term_after > term_before);

    // Committed entries are delivered again after the restart
    let (n, command) = cluster.n_committed(1);
    assert_eq!(n, 3);
    assert_eq!(command, Some(b"11".to_vec()));

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_crashed_follower_catches_up() {
    let mut cluster = TestCluster::new(3);
    cluster.one(b"101", 3, false).await;

    let leader = cluster.check_one_leader().await;
    let follower = leader % 3 + 1;
    cluster.crash(follower);
    cluster.one(b"102", 2, true).await;

    cluster.start(follower);
    let index = cluster.one(b"103", 3, true).await;

    assert!(cluster.log_of(follower).len() as u64 >= index);
    assert!(cluster
        .applied_by(follower)
        .contains(&(index, b"103".to_vec())));

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_crashed_leader_is_replaced() {
    let mut cluster = TestCluster::new(3);
    cluster.one(b"1", 3, false).await;

    let leader = cluster.check_one_leader().await;
    cluster.crash(leader);
    cluster.one(b"2", 2, true).await;

    let new_leader = cluster.check_one_leader().await;
    assert_ne!(new_leader, leader);

    cluster.start(leader);
    cluster.one(b"3", 3, true).await;

    cluster.shutdown();
}
