// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_notify_records_calls() {
    let adapter = FakeNotifyAdapter::new();

    adapter.send("fence", "off nodeA: ok").await.unwrap();
    adapter.send("config", "device D1 added").await.unwrap();

    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].channel, "fence");
    assert_eq!(calls[0].message, "off nodeA: ok");
    assert_eq!(adapter.messages_on("config"), vec!["device D1 added"]);
}
