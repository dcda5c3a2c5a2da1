use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Result;
use crate::protocol::request::parse_transport_request;
use crate::protocol::status::StatusCode;
use crate::protocol::writer::ResponseWriter;
use crate::server::{ConnInfo, Server, Shared};
use crate::transport::{DeadlineStream, Incoming, Transport};

/// Meta sent with `50` when the request names a host this server does not
/// serve.
pub(crate) const HOST_NOT_FOUND: &str = "host not found";

/// Serves the single request of one accepted connection.
///
/// The connection context is derived before the handshake runs, so its
/// deadline bounds the handshake as well as the request and response I/O.
pub(super) async fn serve<S: Transport>(shared: &Shared, ctx: Context, incoming: Incoming<S>) {
    let info = ConnInfo {
        remote_addr: incoming.remote_addr,
    };
    let ctx = match &shared.conn_context {
        Some(hook) => hook(ctx, &info),
        None => ctx,
    };

    let handshake = incoming.handshake;
    let stream = match ctx.deadline() {
        Some(deadline) => match tokio::time::timeout_at(deadline, handshake).await {
            Ok(stream) => stream,
            Err(_) => {
                debug!(remote_addr = %info.remote_addr, "Handshake deadline exceeded");
                return;
            }
        },
        None => handshake.await,
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            debug!(remote_addr = %info.remote_addr, error = %e, "Handshake failed");
            return;
        }
    };
    debug!(remote_addr = %info.remote_addr, "Accepted connection");

    let mut stream = DeadlineStream::new(stream, ctx.deadline());
    let parsed = parse_transport_request(&mut stream).await;

    let (_read, write) = tokio::io::split(stream);
    let mut rw = ResponseWriter::new(write, shared.pool.clone());

    if let Err(e) = respond(shared, ctx, &mut rw, parsed, &info).await {
        debug!(remote_addr = %info.remote_addr, error = %e, "Writing response failed");
    }

    if !rw.is_closed() {
        if let Err(e) = rw.close().await {
            debug!(remote_addr = %info.remote_addr, error = %e, "Closing response failed");
        }
    }
}

async fn respond(
    shared: &Shared,
    ctx: Context,
    rw: &mut ResponseWriter,
    parsed: Result<crate::Request>,
    info: &ConnInfo,
) -> Result<()> {
    let req = match parsed {
        Ok(req) => req,
        Err(e) => {
            warn!(remote_addr = %info.remote_addr, error = %e, "Bad request");
            let code = StatusCode::BadRequest;
            return rw.write_status(code, code.reason()).await;
        }
    };

    if !Server::host_allowed(&shared.hosts, req.url()) {
        warn!(
            remote_addr = %info.remote_addr,
            host = req.host().unwrap_or_default(),
            "Unknown host"
        );
        return rw
            .write_status(StatusCode::PermanentFailure, HOST_NOT_FOUND)
            .await;
    }

    debug!(remote_addr = %info.remote_addr, url = %req.url(), "Serving request");
    if let Err(e) = shared.handler.handle(ctx, rw, req).await {
        warn!(remote_addr = %info.remote_addr, error = %e, "Handler failed");
    }
    Ok(())
}
