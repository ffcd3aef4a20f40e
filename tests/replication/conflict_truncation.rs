//! Uncommitted entries of a deposed leader are overwritten.

use std::time::Duration;

use tokio::time::sleep;

use crate::common::TestCluster;

#[tokio::test(start_paused = true)]
async fn test_deposed_leader_log_is_overwritten() {
    let cluster = TestCluster::new(3);
    for i in 1..=4u64 {
        assert_eq!(cluster.one(format!("agreed-{i}").as_bytes(), 3, false).await, i);
    }

    // The leader takes entries it can never commit
    let old_leader = cluster.check_one_leader().await;
    cluster.disconnect(old_leader);
    for i in 5..=7u64 {
        let (index, _, is_leader) = cluster
            .raft(old_leader)
            .start(format!("lost-{i}").into_bytes())
            .expect("should succeed");
        assert!(is_leader);
        assert_eq!(index, i);
    }

    // The majority moves on without it
    let new_leader = cluster.check_one_leader().await;
    assert_ne!(new_leader, old_leader);
    assert_eq!(cluster.one(b"kept-5", 2, true).await, 5);
    cluster.one(b"kept-6", 2, true).await;

    cluster.connect(old_leader);
    cluster.one(b"after-heal", 3, true).await;
    sleep(Duration::from_millis(250)).await;

    let leader = cluster.check_one_leader().await;
    assert_eq!(cluster.log_of(old_leader), cluster.log_of(leader));
    for entry in cluster.log_of(old_leader) {
        assert!(
            !entry.command.starts_with(b"lost-"),
            "uncommitted entry {} survived",
            entry.index
        );
    }
    let (n, command) = cluster.n_committed(5);
    assert_eq!(n, 3);
    assert_eq!(command, Some(b"kept-5".to_vec()));

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_lagging_follower_catches_up() {
    let cluster = TestCluster::new(3);
    cluster.one(b"first", 3, false).await;

    let leader = cluster.check_one_leader().await;
    let lagging = leader % 3 + 1;
    cluster.disconnect(lagging);

    let mut last = 0;
    for i in 0..30 {
        last = cluster.one(format!("while-away-{i}").as_bytes(), 2, true).await;
    }

    cluster.connect(lagging);
    let index = cluster.one(b"back", 3, true).await;
    assert!(index > last);

    for i in 1..=index {
        let (n, _) = cluster.n_committed(i);
        assert_eq!(n, 3, "index {i} not applied everywhere");
    }
    assert_eq!(cluster.raft(lagging).last_applied(), index);

    cluster.shutdown();
}
