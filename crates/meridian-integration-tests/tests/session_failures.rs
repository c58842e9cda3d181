//! Integration test: how joins fail and race.
//!
//! - a replayed identity envelope is refused by a second session
//! - a seed that goes silent times the joiner out
//! - a seed that hangs up aborts the joiner with `PeerClosed`
//! - two nodes joining the same seed at once both get in, one of them
//!   after the seed re-seeds its session

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;

use meridian_daemon::commands::join::join_network;
use meridian_daemon::rpc::{write_line, RpcRequest, RpcResponse};
use meridian_integration_tests::{
    identity, keypair, node_config, quick_timeouts, socket_path, LocalNet, TestNode, JOINER,
    MEMBERS,
};
use meridian_negotiation::{AbortReason, NegotiationError, StaticStakeLedger};
use meridian_transport::messages::{RequestFrame, METHOD_GET_TOPOLOGY, METHOD_REFACTOR_NETWORK};
use meridian_types::{NetworkTopology, TopologySnapshot};

#[tokio::test]
async fn replayed_identity_refused() {
    let net = LocalNet::bootstrap(&MEMBERS).expect("bootstrap");
    let mut joiner = net.joiner(keypair().expect("keypair"), JOINER).expect("joiner");
    let frames = joiner.start().expect("start");
    let identity_frame = frames
        .into_iter()
        .find(|f| matches!(f, RequestFrame::JoinerIdentity(_)))
        .expect("identity frame");

    let mut first = net.responder(StaticStakeLedger::default());
    first.handle(identity_frame.clone()).expect("first session");

    // Same registry, same envelope: the triple was already recorded.
    let mut second = net.responder(StaticStakeLedger::default());
    let err = second.handle(identity_frame).expect_err("replay");
    assert_eq!(err.reason(), AbortReason::ReplayDetected);
    assert!(second.is_finished());
}

/// A fake seed: answers `get_topology` with `snapshot`, acknowledges
/// `refactor_network`, then either hangs up or goes silent.
async fn fake_seed(path: &Path, snapshot: TopologySnapshot, hang_up: bool) {
    let listener = UnixListener::bind(path).expect("bind");
    let (stream, _) = listener.accept().await.expect("accept");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await.expect("read") {
        let Ok(request) = serde_json::from_str::<RpcRequest>(&line) else {
            // Frames after the switch; a silent seed ignores them.
            continue;
        };
        let result = match request.method.as_str() {
            METHOD_GET_TOPOLOGY => serde_json::to_value(&snapshot).expect("snapshot"),
            METHOD_REFACTOR_NETWORK => serde_json::json!({"mode": "frames"}),
            _ => serde_json::Value::Null,
        };
        write_line(&mut writer, &RpcResponse::success(request.id, result))
            .await
            .expect("write");
        if request.method == METHOD_REFACTOR_NETWORK && hang_up {
            return;
        }
    }
}

fn one_member_snapshot() -> TopologySnapshot {
    let member = keypair().expect("keypair");
    TopologySnapshot {
        version: 1,
        topology: NetworkTopology::single(vec![identity(&member, MEMBERS[0]).expect("identity")]),
    }
}

fn negotiation_reason(err: &anyhow::Error) -> Option<AbortReason> {
    err.downcast_ref::<NegotiationError>().map(NegotiationError::reason)
}

#[tokio::test]
async fn silent_seed_times_out() {
    let path = socket_path("silent");
    let seed = tokio::spawn({
        let path = path.clone();
        async move { fake_seed(&path, one_member_snapshot(), false).await }
    });
    // Let the fake seed bind before connecting.
    while !path.exists() {
        tokio::task::yield_now().await;
    }

    let mut config = node_config("impatient", JOINER);
    quick_timeouts(&mut config, 1);
    let state = TestNode::state(config).expect("state");

    let started = tokio::time::Instant::now();
    let err = join_network(&state, &path).await.expect_err("timeout");
    assert_eq!(negotiation_reason(&err), Some(AbortReason::SessionTimeout));
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert!(!state.is_member());

    seed.abort();
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn hang_up_is_peer_closed() {
    let path = socket_path("hangup");
    let seed = tokio::spawn({
        let path = path.clone();
        async move { fake_seed(&path, one_member_snapshot(), true).await }
    });
    while !path.exists() {
        tokio::task::yield_now().await;
    }

    let state = TestNode::state(node_config("abandoned", JOINER)).expect("state");
    let err = join_network(&state, &path).await.expect_err("peer closed");
    assert_eq!(negotiation_reason(&err), Some(AbortReason::PeerClosed));
    assert_eq!(state.registry.version(), 0);

    seed.await.expect("seed task");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn concurrent_joiners_both_admitted() {
    let seed = TestNode::genesis(node_config("busy", MEMBERS[0])).expect("seed");
    let a = TestNode::state(node_config("a", MEMBERS[1])).expect("state");
    let b = TestNode::state(node_config("b", JOINER)).expect("state");

    let (joined_a, joined_b) = tokio::join!(
        join_network(&a, &seed.socket),
        join_network(&b, &seed.socket)
    );
    let joined_a = joined_a.expect("a joins");
    let joined_b = joined_b.expect("b joins");

    let snapshot = seed.state.registry.snapshot();
    assert_eq!(snapshot.version, 3);
    assert_eq!(snapshot.topology.node_count(), 3);
    assert!(snapshot.topology.contains(&a.keypair.address()));
    assert!(snapshot.topology.contains(&b.keypair.address()));

    // Whoever committed second built on the first commit.
    let mut baselines = [joined_a.baseline_version, joined_b.baseline_version];
    baselines.sort_unstable();
    assert_eq!(baselines, [1, 2]);
    let last = if joined_a.baseline_version == 2 { &a } else { &b };
    assert_eq!(last.registry.snapshot(), snapshot);
}
