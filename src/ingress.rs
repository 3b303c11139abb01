//! Broadcast ingress.
//!
//! A single HTTP route co-hosted with the WebSocket route.  A trusted peer
//! posts `{channel, data}` and the core runs the same fan-out as an
//! in-process channel invocation.  Ingress errors are HTTP statuses; they
//! never reach WebSocket clients.

use crate::state::{AppState, BroadcastError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sa_protocol::{messages, BroadcastRequest, ErrorEnvelope};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            code: code.to_owned(),
            message: message.into(),
        }),
    )
        .into_response()
}

/// Whether `peer` is admitted by the configured allow-list.  Entries are
/// compared as IP addresses; the literal `localhost` matches any loopback
/// peer.
fn peer_allowed(peer: IpAddr, allowed: &HashSet<String>) -> bool {
    let peer = peer.to_canonical();
    for host in allowed {
        if host == "localhost" {
            if peer.is_loopback() {
                return true;
            }
            continue;
        }
        if host.parse::<IpAddr>().is_ok_and(|addr| addr.to_canonical() == peer) {
            return true;
        }
    }
    false
}

pub(crate) async fn broadcast_ingress(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Response {
    if !peer_allowed(peer.ip(), &state.shared.config.broadcast_allowed_hosts) {
        warn!(peer = %peer, "rejected broadcast ingress from non-allow-listed peer");
        return json_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "peer address is not allow-listed",
        );
    }

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", rejection.body_text())
        }
    };

    match state.shared.broadcast(&request.channel, &request.data).await {
        Ok(subscribers) => {
            debug!(channel = %request.channel, subscribers, "ingress broadcast fanned out");
            StatusCode::OK.into_response()
        }
        Err(BroadcastError::UnknownChannel(name)) => json_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            messages::channel_not_found(&name),
        ),
    }
}
