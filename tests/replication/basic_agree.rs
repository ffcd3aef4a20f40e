//! Proposals reach every peer in order.

use std::time::Duration;

use d_raft::proto::Entry;
use tokio::time::sleep;
use tracing_test::traced_test;

use crate::common::TestCluster;

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_start_replicates_and_applies_everywhere() {
    let cluster = TestCluster::new(3);
    let leader = cluster.check_one_leader().await;
    let (term, _) = cluster.raft(leader).get_state();

    let (index, start_term, is_leader) = cluster
        .raft(leader)
        .start(b"x".to_vec())
        .expect("should succeed");
    assert_eq!((index, start_term, is_leader), (1, term, true));

    // A couple of heartbeat rounds
    sleep(Duration::from_millis(250)).await;

    for id in cluster.ids() {
        assert_eq!(
            cluster.log_of(*id),
            vec![Entry {
                index: 1,
                term,
                command: b"x".to_vec()
            }]
        );
        assert_eq!(cluster.applied_by(*id), vec![(1, b"x".to_vec())]);
        assert_eq!(cluster.raft(*id).last_applied(), 1);
    }
    assert_eq!(cluster.raft(leader).commit_index(), 1);

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_basic_agree() {
    let cluster = TestCluster::new(3);

    for i in 1..=3u64 {
        let (n, _) = cluster.n_committed(i);
        assert_eq!(n, 0, "some have committed before start()");

        let index = cluster.one(format!("cmd-{i}").as_bytes(), 3, false).await;
        assert_eq!(index, i);
    }

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_follower_rejects_start() {
    let cluster = TestCluster::new(3);
    let leader = cluster.check_one_leader().await;

    for id in cluster.ids() {
        if *id == leader {
            continue;
        }
        let (_, _, is_leader) = cluster
            .raft(*id)
            .start(b"nope".to_vec())
            .expect("should succeed");
        assert!(!is_leader);
        assert!(cluster.log_of(*id).is_empty());
    }

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts() {
    let cluster = TestCluster::new(3);
    let leader = cluster.check_one_leader().await;

    let mut indices = Vec::new();
    for i in 0..20 {
        let (index, _, is_leader) = cluster
            .raft(leader)
            .start(format!("burst-{i}").into_bytes())
            .expect("should succeed");
        assert!(is_leader);
        indices.push(index);
    }
    assert_eq!(indices, (1..=20).collect::<Vec<u64>>());

    sleep(Duration::from_millis(500)).await;
    for index in indices {
        let (n, cmd) = cluster.n_committed(index);
        assert_eq!(n, 3);
        assert_eq!(cmd, Some(format!("burst-{}", index - 1).into_bytes()));
    }

    cluster.shutdown();
}
