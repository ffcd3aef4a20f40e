//! A fresh cluster elects exactly one leader and keeps it while the network
//! is healthy.

use std::time::Duration;

use d_raft::LEADER;
use tokio::time::sleep;
use tracing_test::traced_test;

use crate::common::TestCluster;
use crate::common::ELECTION_TIMEOUT_MAX_MS;

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_initial_election() {
    let cluster = TestCluster::new(3);

    let leader = cluster.check_one_leader().await;
    let term1 = cluster.check_terms();
    assert!(term1 >= 1, "term is {term1}, but should be at least 1");
    assert_eq!(cluster.raft(leader).role(), LEADER);

    // Heartbeats keep the leader in place
    sleep(Duration::from_millis(2 * ELECTION_TIMEOUT_MAX_MS)).await;
    let term2 = cluster.check_terms();
    assert_eq!(term1, term2, "term changed with no failures");
    assert_eq!(cluster.check_one_leader().await, leader);

    // Everybody voted in the winning term, most for the leader
    let votes_for_leader = cluster
        .ids()
        .iter()
        .filter(|id| cluster.raft(**id).voted_for() == Some(leader))
        .count();
    assert!(votes_for_leader >= 2);

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_five_peer_election_has_single_leader_per_term() {
    let cluster = TestCluster::new(5);

    for _ in 0..5 {
        let leader = cluster.check_one_leader().await;
        let (_, is_leader) = cluster.raft(leader).get_state();
        assert!(is_leader);
    }

    cluster.shutdown();
}
