// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use proptest::prelude::*;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn record(op: &str, target: &str, state: HistoryState, ended: Option<i64>) -> HistoryRecord {
    HistoryRecord {
        op_id: OpId::from(op),
        target: target.into(),
        action: Action::Off,
        origin: "client".into(),
        coordinator: "node1".into(),
        delegate: (state == HistoryState::Success).then(|| "node1".to_string()),
        state,
        rc: 0,
        reason: None,
        started: at(0),
        ended: ended.map(at),
    }
}

#[test]
fn first_write_wins() {
    let mut store = HistoryStore::default();
    assert_eq!(
        store.append(record("op-1", "nodeA", HistoryState::Success, Some(5))),
        AppendOutcome::Inserted
    );
    assert_eq!(
        store.append(record("op-1", "nodeA", HistoryState::Failure, Some(6))),
        AppendOutcome::Discarded
    );
    assert_eq!(
        store.get(&OpId::from("op-1")).map(|r| r.state),
        Some(HistoryState::Success)
    );
}

#[test]
fn terminal_record_upgrades_placeholder() {
    let mut store = HistoryStore::default();
    store.append(record("op-1", "nodeA", HistoryState::Pending, None));
    assert_eq!(
        store.append(record("op-1", "nodeA", HistoryState::Pending, None)),
        AppendOutcome::Discarded
    );
    assert_eq!(
        store.append(record("op-1", "nodeA", HistoryState::Success, Some(3))),
        AppendOutcome::Upgraded
    );
    assert_eq!(store.len(), 1);
    assert!(store.for_target("nodeA")[0].is_terminal());
}

#[test]
fn placeholder_never_downgrades_terminal() {
    let mut store = HistoryStore::default();
    store.append(record("op-1", "nodeA", HistoryState::Failure, Some(3)));
    assert_eq!(
        store.append(record("op-1", "nodeA", HistoryState::Pending, None)),
        AppendOutcome::Discarded
    );
}

#[test]
fn records_are_ordered_by_end_then_op_id() {
    let mut store = HistoryStore::default();
    store.append(record("op-3", "nodeA", HistoryState::Success, Some(10)));
    store.append(record("op-2", "nodeA", HistoryState::Success, Some(5)));
    store.append(record("op-1", "nodeA", HistoryState::Failure, Some(10)));

    let ids: Vec<String> = store
        .for_target("nodeA")
        .into_iter()
        .map(|r| r.op_id.0)
        .collect();
    assert_eq!(ids, vec!["op-2", "op-1", "op-3"]);
}

#[test]
fn cap_evicts_oldest_per_target() {
    let mut store = HistoryStore::new(2);
    store.append(record("op-1", "nodeA", HistoryState::Success, Some(1)));
    store.append(record("op-2", "nodeA", HistoryState::Success, Some(2)));
    store.append(record("op-3", "nodeA", HistoryState::Success, Some(3)));
    store.append(record("op-9", "nodeB", HistoryState::Success, Some(0)));

    assert_eq!(store.for_target("nodeA").len(), 2);
    assert!(store.get(&OpId::from("op-1")).is_none());
    assert!(store.get(&OpId::from("op-9")).is_some());
    assert_eq!(store.len(), 3);
}

#[test]
fn since_returns_newer_records_only() {
    let mut store = HistoryStore::default();
    store.append(record("op-1", "nodeA", HistoryState::Success, Some(1)));
    store.append(record("op-2", "nodeB", HistoryState::Success, Some(7)));

    assert_eq!(store.high_water_mark(), Some(at(7)));
    let newer = store.since(Some(at(1)));
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].op_id, OpId::from("op-2"));
    assert_eq!(store.since(None).len(), 2);
}

#[test]
fn recent_success_respects_window_and_action() {
    let mut store = HistoryStore::default();
    store.append(record("op-1", "nodeA", HistoryState::Success, Some(100)));
    store.append(record("op-2", "nodeA", HistoryState::Failure, Some(110)));

    let now = at(130);
    assert!(store
        .recent_success("nodeA", Action::Off, Duration::from_secs(60), now)
        .is_some());
    assert!(store
        .recent_success("nodeA", Action::Off, Duration::from_secs(10), now)
        .is_none());
    assert!(store
        .recent_success("nodeA", Action::Reboot, Duration::from_secs(60), now)
        .is_none());
}

#[test]
fn find_accepts_unique_prefix() {
    let mut store = HistoryStore::default();
    store.append(record("abc-1", "nodeA", HistoryState::Success, Some(1)));
    store.append(record("abd-2", "nodeA", HistoryState::Success, Some(2)));

    assert_eq!(
        store.find("abc").map(|r| r.op_id.clone()),
        Some(OpId::from("abc-1"))
    );
    assert!(store.find("ab").is_none());
}

fn arb_record() -> impl Strategy<Value = HistoryRecord> {
    (0u8..6, prop::bool::ANY, 0i64..20).prop_map(|(op, terminal, end)| {
        if terminal {
            record(&format!("op-{op}"), "nodeA", HistoryState::Success, Some(end))
        } else {
            record(&format!("op-{op}"), "nodeA", HistoryState::Pending, None)
        }
    })
}

proptest! {
    // Every peer sees the same deliveries in some order; the terminal record
    // of an op id must win wherever a placeholder arrived first.
    #[test]
    fn peers_converge_on_terminal_records(
        writes in prop::collection::vec(arb_record(), 1..30),
        seed in 0u64..1000,
    ) {
        // One writer per op id: the first terminal write for each op is the
        // coordinator's record; placeholders may arrive in any order.
        let mut canonical: HashMap<OpId, HistoryRecord> = HashMap::new();
        for w in writes.iter().filter(|w| w.is_terminal()) {
            canonical.entry(w.op_id.clone()).or_insert_with(|| w.clone());
        }
        let deliveries: Vec<HistoryRecord> = writes
            .iter()
            .map(|w| {
                if w.is_terminal() {
                    canonical[&w.op_id].clone()
                } else {
                    w.clone()
                }
            })
            .collect();

        let mut shuffled = deliveries.clone();
        let len = shuffled.len();
        for i in 0..len {
            let j = ((seed as usize).wrapping_mul(31).wrapping_add(i * 17)) % len;
            shuffled.swap(i, j);
        }

        let mut a = HistoryStore::default();
        let mut b = HistoryStore::default();
        for r in deliveries {
            a.append(r);
        }
        for r in shuffled {
            b.append(r);
        }

        for (op, rec) in &canonical {
            prop_assert_eq!(a.get(op), Some(rec));
            prop_assert_eq!(b.get(op), Some(rec));
        }
        prop_assert_eq!(a.len(), b.len());
    }
}
