//! Agreement over a network that delays and loses messages.

use crate::common::TestCluster;

#[tokio::test(start_paused = true)]
async fn test_unreliable_agree() {
    let cluster = TestCluster::new(5);
    cluster.network.set_reliable(false);

    let mut last = 0;
    for i in 1..=10 {
        let index = cluster.one(format!("u-{i}").as_bytes(), 1, true).await;
        assert!(index > last);
        last = index;
    }

    cluster.network.set_reliable(true);
    let index = cluster.one(b"settled", 5, true).await;

    for i in 1..=index {
        let (n, _) = cluster.n_committed(i);
        assert_eq!(n, 5, "index {i} not applied everywhere");
    }
    cluster.check_one_leader().await;

    cluster.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unreliable_election_keeps_one_leader_per_term() {
    let cluster = TestCluster::new(5);
    cluster.network.set_reliable(false);

    for _ in 0..5 {
        // Panics on two leaders in one term
        cluster.check_one_leader().await;
    }

    cluster.shutdown();
}
