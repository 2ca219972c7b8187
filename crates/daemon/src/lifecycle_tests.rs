// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fenced_adapters::peer::wire::write_envelope;
use fenced_core::{OpId, PeerEnvelope, PeerMessage};

const ONE_DEVICE: &str = r#"
[[node]]
name = "node1"

[[primitive]]
id = "D1"
class = "stonith"
agent = "fence_dummy"
params = { pcmk_host_list = "node2" }

[[location]]
resource = "D1"
node = "node1"
score = 100
"#;

fn watcher(dir: &tempfile::TempDir, content: &str) -> (ConfigWatcher, PathBuf) {
    let path = dir.path().join("cluster.toml");
    std::fs::write(&path, content).unwrap();
    (
        ConfigWatcher::new(path.clone(), ConfigEvaluator::new("node1")),
        path,
    )
}

#[test]
fn first_poll_yields_a_pass() {
    let dir = tempfile::tempdir().unwrap();
    let (mut watcher, _) = watcher(&dir, ONE_DEVICE);

    let pass = watcher.poll().unwrap().expect("no pass");
    let ids: Vec<_> = pass.accepted().map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec!["D1"]);
}

#[test]
fn unchanged_document_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut watcher, _) = watcher(&dir, ONE_DEVICE);

    assert!(watcher.poll().unwrap().is_some());
    assert!(watcher.poll().unwrap().is_none());
}

#[test]
fn edited_document_yields_a_new_pass() {
    let dir = tempfile::tempdir().unwrap();
    let (mut watcher, path) = watcher(&dir, ONE_DEVICE);
    watcher.poll().unwrap();

    let edited = ONE_DEVICE.replace("score = 100", "score = -1");
    std::fs::write(&path, edited).unwrap();

    let pass = watcher.poll().unwrap().expect("change not seen");
    assert_eq!(pass.accepted().count(), 0);
}

#[test]
fn broken_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut watcher, _) = watcher(&dir, "[[primitive]]\nid = ");

    assert!(matches!(
        watcher.poll(),
        Err(LifecycleError::ClusterConfig(..))
    ));
}

#[test]
fn missing_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = ConfigWatcher::new(dir.path().join("absent.toml"), ConfigEvaluator::new("n1"));

    assert!(watcher.poll().is_err());
}

#[tokio::test]
async fn log_notifier_accepts_messages() {
    let notifier = Notifier::Log(LogNotifyAdapter::new());
    assert!(notifier.send("fence", "{}").await.is_ok());
}

#[tokio::test]
async fn peer_messages_reach_the_event_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(serve_peers(listener, tx));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_envelope(
        &mut stream,
        &PeerEnvelope {
            from: "node2".to_string(),
            message: PeerMessage::CancelRequest {
                op_id: OpId::from("op-1"),
                attempt: 1,
            },
        },
    )
    .await
    .unwrap();

    match rx.recv().await {
        Some(RuntimeEvent::Peer { from, message }) => {
            assert_eq!(from, "node2");
            assert!(matches!(message, PeerMessage::CancelRequest { .. }));
        }
        other => panic!("expected peer message, got {other:?}"),
    }
}
