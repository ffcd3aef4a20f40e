//! Progress with a minority of peers unreachable.

use std::time::Duration;

use tokio::time::sleep;

use crate::common::TestCluster;
use crate::common::ELECTION_TIMEOUT_MAX_MS;

#[tokio::test(start_paused = true)]
async fn test_fail_agree() {
    let cluster = TestCluster::new(3);
    cluster.one(b"101", 3, false).await;

    // One follower goes away; the other two still agree
    let leader = cluster.check_one_leader().await;
    let follower = leader % 3 + 1;
    cluster.disconnect(follower);

    cluster.one(b"102", 2, false).await;
    cluster.one(b"103", 2, false).await;
    sleep(Duration::from_millis(ELECTION_TIMEOUT_MAX_MS)).await;
    cluster.one(b"104", 2, false).await;

    // It comes back and catches up
    cluster.connect(follower);
    cluster.one(b"106", 3, true).await;
    sleep(Duration::from_millis(ELECTION_TIMEOUT_MAX_MS)).await;
    cluster.one(b"107", 3, true).await;

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_fail_no_agree() {
    let cluster = TestCluster::new(5);
    cluster.one(b"10", 5, false).await;

    // Three of five followers unreachable
    let leader = cluster.check_one_leader().await;
    let followers: Vec<u32> = cluster.ids().iter().copied().filter(|id| *id != leader).collect();
    for id in &followers[..3] {
        cluster.disconnect(*id);
    }

    let (index, _, is_leader) = cluster
        .raft(leader)
        .start(b"20".to_vec())
        .expect("should succeed");
    assert!(is_leader);
    assert_eq!(index, 2);

    sleep(Duration::from_millis(2 * ELECTION_TIMEOUT_MAX_MS)).await;
    let (n, _) = cluster.n_committed(index);
    assert_eq!(n, 0, "{n} committed but no majority");

    // Repair
    for id in &followers[..3] {
        cluster.connect(*id);
    }
    cluster.one(b"30", 5, true).await;

    cluster.shutdown();
}
