//! Leader loss and recovery under partitions.

use std::time::Duration;

use d_raft::FOLLOWER;
use tokio::time::sleep;

use crate::common::TestCluster;
use crate::common::ELECTION_TIMEOUT_MAX_MS;

#[tokio::test(start_paused = true)]
async fn test_partitioned_leader_is_replaced_and_steps_down() {
    let cluster = TestCluster::new(3);
    let old_leader = cluster.check_one_leader().await;
    let (old_term, _) = cluster.raft(old_leader).get_state();

    cluster.disconnect(old_leader);
    sleep(Duration::from_millis(2 * ELECTION_TIMEOUT_MAX_MS)).await;

    // One of the two remaining peers took over in a later term
    let new_leader = cluster.check_one_leader().await;
    assert_ne!(new_leader, old_leader);
    let (new_term, is_leader) = cluster.raft(new_leader).get_state();
    assert!(is_leader);
    assert!(new_term > old_term);

    // The isolated leader still believes in itself
    assert_eq!(cluster.raft(old_leader).get_state(), (old_term, true));

    // Rejoining, it sees the higher term and steps down
    cluster.connect(old_leader);
    sleep(Duration::from_millis(ELECTION_TIMEOUT_MAX_MS)).await;
    assert_eq!(cluster.raft(old_leader).role(), FOLLOWER);
    assert!(cluster.raft(old_leader).current_term() >= new_term);
    assert_eq!(cluster.check_one_leader().await, new_leader);

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_no_leader_without_quorum() {
    let cluster = TestCluster::new(3);
    let leader = cluster.check_one_leader().await;

    // Leave a single follower on its own
    let follower = cluster
        .ids()
        .iter()
        .copied()
        .find(|id| *id != leader)
        .expect("cluster has followers");
    for id in cluster.ids() {
        if *id != follower {
            cluster.disconnect(*id);
        }
    }
    sleep(Duration::from_millis(4 * ELECTION_TIMEOUT_MAX_MS)).await;
    cluster.check_no_leader();

    // It kept campaigning in the meantime
    let (term, _) = cluster.raft(follower).get_state();
    assert!(term > 1);

    // Quorum returns
    for id in cluster.ids() {
        cluster.connect(*id);
    }
    cluster.check_one_leader().await;

    cluster.shutdown();
}
