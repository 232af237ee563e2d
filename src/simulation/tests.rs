//! Simulation Tests
//!
//! Whole-cluster scenarios over the emulated network, plus the HTTP handlers.
//!
//! ## Test Scopes
//! - **Convergence**: nodes join via the introducer and agree on membership.
//! - **CRUD**: client operations succeed end to end through quorum.
//! - **Failure**: a silenced node is removed everywhere exactly once and its keys are
//!   re-replicated onto the new replica sets.
//! - **Handlers**: request validation, transaction polling, views.

#[cfg(test)]
mod tests {
    use crate::audit::{AuditLog, Outcome};
    use crate::config::ClusterConfig;
    use crate::membership::types::{Address, Phase};
    use crate::replication::transaction::TransactionId;
    use crate::simulation::Simulation;
    use crate::simulation::handlers::{
        NodeQuery, SharedSimulation, TxnStatus, WriteRequest, handle_create, handle_members,
        handle_read, handle_ring, handle_stats, handle_txn_status,
    };
    use axum::Json;
    use axum::extract::{Extension, Path, Query};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn config(nodes: usize) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.simulation.nodes = nodes;
        config
    }

    fn converged(nodes: usize) -> Simulation {
        let mut sim = Simulation::new(config(nodes)).unwrap();
        assert!(
            sim.run_until(200, Simulation::is_converged),
            "Cluster of {} did not converge",
            nodes
        );
        sim
    }

    /// Steps until every transaction has an outcome.
    fn settle(sim: &mut Simulation, txns: &[TransactionId]) {
        let audit = sim.audit();
        let done = sim.run_until(50, |_| txns.iter().all(|t| audit.outcome(*t).is_some()));
        assert!(done, "Transactions never decided");
    }

    // ============================================================
    // DRIVER TESTS
    // ============================================================

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config(3);
        bad.membership.remove_after = bad.membership.suspect_after;
        assert!(Simulation::new(bad).is_err());
    }

    #[test]
    fn test_join_schedule() {
        let mut sim = Simulation::new(config(3)).unwrap();
        assert!(sim.nodes().iter().all(|n| n.phase() == Phase::Uninitialized));

        sim.step();
        assert_eq!(sim.node(&Address::new(1, 0)).unwrap().phase(), Phase::Active);
        assert_eq!(sim.node(&Address::new(2, 0)).unwrap().phase(), Phase::Uninitialized);

        sim.step();
        assert_eq!(sim.node(&Address::new(2, 0)).unwrap().phase(), Phase::Joining);
    }

    #[test]
    fn test_unknown_or_failed_nodes() {
        let mut sim = converged(3);
        let target = Simulation::address_of(2);

        assert!(!sim.fail_node(&Address::new(99, 0)));
        assert!(sim.fail_node(&target));
        assert!(sim.create(&target, "k", "v").is_none());
        assert!(sim.network().is_isolated(&target));
        assert_eq!(sim.live_addresses().len(), 2);
    }

    // ============================================================
    // SCENARIO TESTS
    // ============================================================

    #[test]
    fn test_three_nodes_converge_then_create_and_read() {
        let mut sim = converged(3);

        let expected: Vec<Address> = (1..=3).map(|i| Address::new(i, 0)).collect();
        for node in sim.nodes() {
            let mut members = node.membership().table().addresses();
            members.sort();
            assert_eq!(members, expected);
            assert_eq!(node.ring(), sim.nodes()[0].ring(), "Rings must agree");
        }

        let a = Simulation::address_of(0);
        let create = sim.create(&a, "k1", "v1").unwrap();
        settle(&mut sim, &[create]);

        let audit = sim.audit();
        assert_eq!(audit.outcome(create).unwrap().outcome, Outcome::Success);
        assert_eq!(sim.holders("k1").len(), 3);

        for i in 0..3 {
            let read = sim.read(&Simulation::address_of(i), "k1").unwrap();
            settle(&mut sim, &[read]);
            let outcome = audit.outcome(read).unwrap();
            assert_eq!(outcome.outcome, Outcome::Success);
            assert_eq!(outcome.value.as_deref(), Some("v1"));
        }
    }

    #[test]
    fn test_failed_node_is_removed_and_keys_re_replicated() {
        let mut sim = converged(6);
        let failed = Simulation::address_of(1);
        let client = Simulation::address_of(0);

        // The failed node's own address string is a key it coordinates.
        let mut keys: Vec<String> = (0..15).map(|i| format!("key_{}", i)).collect();
        keys.push(failed.to_string());

        let txns: Vec<TransactionId> = keys
            .iter()
            .map(|key| sim.create(&client, key, "v").unwrap())
            .collect();
        settle(&mut sim, &txns);
        let audit = sim.audit();
        assert!(
            txns.iter()
                .all(|t| audit.outcome(*t).unwrap().outcome == Outcome::Success)
        );

        assert!(sim.fail_node(&failed));
        let remove_after = sim.config().membership.remove_after;
        sim.run(remove_after + 10);

        for node in sim.nodes().iter().filter(|n| !n.is_failed()) {
            assert!(
                !node.membership().table().contains(&failed),
                "{} still lists {}",
                node.address(),
                failed
            );
            assert_eq!(audit.removals(node.address(), failed), 1);
            assert!(!node.ring().contains(&failed));
        }

        let ring = sim.node(&client).unwrap().ring().clone();
        for key in &keys {
            let holders = sim.holders(key);
            for replica in ring.find_replicas(key) {
                assert!(
                    holders.contains(&replica.address),
                    "{} not re-replicated onto {}",
                    key,
                    replica.address
                );
            }
        }

        let read = sim.read(&client, &failed.to_string()).unwrap();
        settle(&mut sim, &[read]);
        assert_eq!(audit.outcome(read).unwrap().outcome, Outcome::Success);
    }

    // ============================================================
    // HANDLER TESTS
    // ============================================================

    fn shared(sim: Simulation) -> (SharedSimulation, Arc<AuditLog>) {
        let audit = sim.audit();
        (Arc::new(Mutex::new(sim)), audit)
    }

    #[tokio::test]
    async fn test_create_handler_then_poll_outcome() {
        let (sim, audit) = shared(converged(3));

        let (status, Json(resp)) = handle_create(
            Extension(sim.clone()),
            Json(WriteRequest {
                node: Some("2:0".into()),
                key: "k".into(),
                value: "v".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(resp.coordinator.as_deref(), Some("2:0"));
        let txn = resp.txn.unwrap();

        let (status, Json(pending)) =
            handle_txn_status(Extension(audit.clone()), Path(txn.0)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(pending.status, TxnStatus::Pending);

        sim.lock().await.run(10);

        let (status, Json(done)) = handle_txn_status(Extension(audit), Path(txn.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done.status, TxnStatus::Success);
        assert_eq!(done.key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_handlers_reject_unknown_nodes() {
        let (sim, _) = shared(converged(3));

        let (status, Json(resp)) = handle_read(
            Extension(sim.clone()),
            Path("k".into()),
            Query(NodeQuery {
                node: Some("9:0".into()),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp.txn.is_none());
        assert!(resp.error.is_some());

        let (status, _) = handle_create(
            Extension(sim.clone()),
            Json(WriteRequest {
                node: Some("garbage".into()),
                key: "k".into(),
                value: "v".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(members)) =
            handle_members(Extension(sim), Path("9:0".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn test_failed_coordinator_is_unavailable() {
        let (sim, _) = shared(converged(3));
        sim.lock().await.fail_node(&Address::new(3, 0));

        let (status, Json(resp)) = handle_create(
            Extension(sim),
            Json(WriteRequest {
                node: Some("3:0".into()),
                key: "k".into(),
                value: "v".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(resp.txn.is_none());
    }

    #[tokio::test]
    async fn test_views() {
        let (sim, _) = shared(converged(4));

        let (status, Json(members)) =
            handle_members(Extension(sim.clone()), Path("1:0".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(members.len(), 4);
        assert_eq!(members[0].address, "1:0");
        assert!(members.iter().all(|m| !m.suspect));

        let (status, Json(ring)) =
            handle_ring(Extension(sim.clone()), Query(NodeQuery::default())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ring.len(), 4);
        assert!(ring.windows(2).all(|w| w[0].position <= w[1].position));

        let (status, Json(stats)) = handle_stats(Extension(sim)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(stats.converged);
        assert_eq!(stats.live_nodes, 4);
        assert_eq!(stats.nodes.len(), 4);
    }
}
