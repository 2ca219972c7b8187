// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fenced_adapters::AgentInvocation;
use fenced_core::{Action, OpId};
use std::time::Duration;

fn job(device: &str, attempt: u32) -> AgentJob {
    AgentJob {
        kind: JobKind::Attempt {
            op_id: OpId::from("op-1"),
            attempt,
        },
        invocation: AgentInvocation {
            device: device.into(),
            agent: "fence_dummy".into(),
            action: Action::Off,
            args: vec![("action".into(), "off".into())],
            timeout: Duration::from_secs(5),
        },
        retries: 0,
    }
}

#[test]
fn idle_device_starts_immediately() {
    let mut queues = DeviceQueues::new();
    let started = queues.submit(job("D1", 1)).unwrap();
    assert!(started.is_some());
    assert!(queues.is_busy("D1"));
    assert!(!queues.is_busy("D2"));
}

#[test]
fn busy_device_runs_jobs_in_order() {
    let mut queues = DeviceQueues::new();
    queues.submit(job("D1", 1)).unwrap();
    assert!(queues.submit(job("D1", 2)).unwrap().is_none());
    assert!(queues.submit(job("D1", 3)).unwrap().is_none());
    // other devices are independent
    assert!(queues.submit(job("D2", 4)).unwrap().is_some());

    let next = queues.finish("D1").unwrap();
    assert_eq!(next.job.kind, job("D1", 2).kind);
    let next = queues.finish("D1").unwrap();
    assert_eq!(next.job.kind, job("D1", 3).kind);
    assert!(queues.finish("D1").is_none());
    assert!(!queues.is_busy("D1"));
}

#[test]
fn full_queue_rejects_work() {
    let mut queues = DeviceQueues::new();
    queues.submit(job("D1", 0)).unwrap();
    for n in 1..=QUEUE_LIMIT as u32 {
        assert!(queues.submit(job("D1", n)).is_ok());
    }
    assert_eq!(queues.pending("D1"), QUEUE_LIMIT);

    let rejected = queues.submit(job("D1", 99)).unwrap_err();
    assert_eq!(rejected.kind, job("D1", 99).kind);
}

#[test]
fn cancel_removes_waiting_job() {
    let mut queues = DeviceQueues::new();
    queues.submit(job("D1", 1)).unwrap();
    queues.submit(job("D1", 2)).unwrap();

    let waiting = job("D1", 2).kind;
    assert!(matches!(
        queues.cancel("D1", &waiting, false),
        CancelOutcome::Dequeued(j) if j.kind == waiting
    ));
    assert!(queues.finish("D1").is_none());
}

#[test]
fn cancel_signals_running_job_only_when_asked() {
    let mut queues = DeviceQueues::new();
    let started = queues.submit(job("D1", 1)).unwrap().unwrap();
    let running = job("D1", 1).kind;

    assert!(matches!(
        queues.cancel("D1", &running, false),
        CancelOutcome::Running
    ));
    assert!(!*started.cancel.borrow());

    assert!(matches!(
        queues.cancel("D1", &running, true),
        CancelOutcome::Signalled
    ));
    assert!(*started.cancel.borrow());

    assert!(matches!(
        queues.cancel("D9", &running, true),
        CancelOutcome::NotFound
    ));
}
