// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fenced_adapters::{AgentAdapter, NotifyAdapter, PeerAdapter};
use fenced_core::{Candidate, Clock, FenceError, IdGen, RegisterOutcome};
use fenced_daemon::config::DaemonConfig;
use fenced_daemon::protocol::{
    self, CandidateSummary, DaemonStatus, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};
use fenced_engine::{FenceOutcome, FenceRequest, FencerCore};
use thiserror::Error;
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Used when a `metadata` request names no timeout
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

/// What every connection handler shares
pub struct ServerContext<A, P, N, C: Clock, I: IdGen> {
    pub core: Arc<FencerCore<A, P, N, C, I>>,
    privileged_uids: Vec<u32>,
    daemon_uid: u32,
    start_time: Instant,
    shutdown: Arc<Notify>,
}

impl<A, P, N, C: Clock, I: IdGen> Clone for ServerContext<A, P, N, C, I> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            privileged_uids: self.privileged_uids.clone(),
            daemon_uid: self.daemon_uid,
            start_time: self.start_time,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<A, P, N, C, I> ServerContext<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        core: Arc<FencerCore<A, P, N, C, I>>,
        config: &DaemonConfig,
        daemon_uid: u32,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            core,
            privileged_uids: config.privileged_uids.clone(),
            daemon_uid,
            start_time: Instant::now(),
            shutdown,
        }
    }

    fn is_privileged(&self, uid: Option<u32>) -> bool {
        match uid {
            Some(uid) => {
                uid == 0 || uid == self.daemon_uid || self.privileged_uids.contains(&uid)
            }
            None => false,
        }
    }
}

/// Handle a single client connection
pub async fn handle_connection<A, P, N, C, I>(
    ctx: ServerContext<A, P, N, C, I>,
    stream: UnixStream,
) -> Result<(), ServerError>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    let uid = stream.peer_cred().ok().map(|cred| cred.uid());
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            let response = Response::error(&FenceError::BadRequest(e.to_string()));
            protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(op = request.op(), ?uid, "request");
    let response = handle_request(&ctx, request, uid).await;
    debug!(?response, "response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<A, P, N, C, I>(
    ctx: &ServerContext<A, P, N, C, I>,
    request: Request,
    uid: Option<u32>,
) -> Response
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    let privileged = ctx.is_privileged(uid);
    let core = &ctx.core;

    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                info!(client = %version, ours = PROTOCOL_VERSION, "protocol version mismatch");
            }
            Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }

        Request::Status => {
            let status = core.status();
            Response::Status {
                status: DaemonStatus {
                    node: status.node,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs: ctx.start_time.elapsed().as_secs(),
                    devices: status.devices,
                    levels: status.levels,
                    operations: status.operations,
                    active_peers: status.active_peers,
                    busy_devices: status.busy_devices,
                },
            }
        }

        Request::Shutdown => {
            if !privileged {
                return denied("shutdown");
            }
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }

        request @ Request::RegisterDevice { .. } => {
            if !privileged {
                return denied("register_device");
            }
            let Some(spec) = request.device_spec() else {
                return Response::error(&FenceError::BadRequest("not a registration".to_string()));
            };
            let device = spec.id.clone();
            match core.register_device(spec).await {
                Ok(outcome) => Response::Registered {
                    device,
                    replaced: outcome == RegisterOutcome::Replaced,
                    disabled: outcome == RegisterOutcome::Disabled,
                },
                Err(e) => Response::Error {
                    rc: e.rc(),
                    reason: e.to_string(),
                },
            }
        }

        Request::DeregisterDevice { device } => {
            if !privileged {
                return denied("deregister_device");
            }
            done(core.deregister_device(&device).await)
        }

        Request::RegisterLevel {
            target,
            index,
            devices,
        } => {
            if !privileged {
                return denied("register_level");
            }
            done(core.register_level(target, index, devices).await)
        }

        Request::DeregisterLevel { target, index } => {
            if !privileged {
                return denied("deregister_level");
            }
            done(core.deregister_level(target, index).await)
        }

        Request::ListRegistered => Response::Devices {
            devices: core.list_registered(),
        },

        Request::ListInstalled => match core.list_installed().await {
            Ok(agents) => Response::Agents { agents },
            Err(e) => Response::error(&e),
        },

        Request::Query { target, action } => Response::Candidates {
            candidates: core
                .query(&target, action)
                .iter()
                .map(candidate_summary)
                .collect(),
        },

        Request::DeviceStatus { device, timeout_s } => {
            let timeout = timeout_s.map(Duration::from_secs);
            match core.device_status(&device, timeout) {
                Ok(rx) => match rx.await {
                    Ok(result) => done(result),
                    Err(_) => Response::error(&FenceError::Unknown(format!(
                        "status check of {device} abandoned"
                    ))),
                },
                Err(e) => Response::error(&e),
            }
        }

        Request::Metadata { agent, timeout_s } => {
            let timeout = timeout_s.map(Duration::from_secs).unwrap_or(METADATA_TIMEOUT);
            match core.metadata(&agent, timeout).await {
                Ok(metadata) => Response::Metadata { metadata },
                Err(e) => Response::error(&e),
            }
        }

        Request::Fence {
            target,
            action,
            timeout_s,
            tolerance_s,
            allow_self_fencing,
            detach,
            client_id,
        } => {
            let origin = client_id.unwrap_or_else(|| match uid {
                Some(uid) => format!("uid:{uid}"),
                None => "client".to_string(),
            });
            let mut request = FenceRequest::new(target, action).origin(origin);
            if let Some(secs) = timeout_s {
                request = request.timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = tolerance_s {
                request = request.tolerance(Duration::from_secs(secs));
            }
            if allow_self_fencing {
                request = request.allow_self_fencing();
            }
            if privileged {
                request = request.privileged();
            }

            let handle = match core.fence(request).await {
                Ok(handle) => handle,
                Err(e) => return Response::error(&e),
            };
            if detach {
                return Response::Accepted {
                    op_id: handle.op_id,
                    merged: handle.merged,
                };
            }
            match handle.wait().await {
                Ok(outcome) => fenced(outcome),
                Err(e) => Response::error(&e),
            }
        }

        Request::Cancel { op_id } => done(core.cancel(&op_id).await),

        Request::History { target } => Response::History {
            records: core.history(target.as_deref()),
        },
    }
}

fn denied(op: &str) -> Response {
    Response::error(&FenceError::Denied(format!("{op} needs a privileged client")))
}

fn done(result: Result<(), FenceError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => Response::error(&e),
    }
}

fn fenced(outcome: FenceOutcome) -> Response {
    match outcome.result {
        Ok(delegate) => Response::Fenced {
            op_id: outcome.op_id,
            rc: 0,
            reason: None,
            delegate: Some(delegate),
            merged: outcome.merged,
        },
        Err(e) => Response::Fenced {
            op_id: outcome.op_id,
            rc: e.rc(),
            reason: Some(e.reason()),
            delegate: None,
            merged: outcome.merged,
        },
    }
}

fn candidate_summary(candidate: &Candidate) -> CandidateSummary {
    CandidateSummary {
        peer: candidate.peer.clone(),
        device: candidate.device.clone(),
        rank: candidate.rank.as_str().to_string(),
        timeout_s: candidate.timeout.as_secs(),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
