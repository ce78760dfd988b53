//! RPC entry point shared by interior stages and the completion intake.

use std::{future::Future, sync::Arc};

use comms::msg::{FORWARD_OP, Msg};
use log::{debug, warn};
use tokio::{
    io::{self, AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::error::Result;

/// Receiving side of the single-operation pipeline RPC.
///
/// The serve loop decodes frames and dispatches strictly on the operation
/// name; implementors only see validated `forward` calls.
pub trait ForwardHandler: Send + Sync + 'static {
    /// Processes one forward call addressed to the `next` role.
    ///
    /// Returning `Ok` acks the caller. Returning an error drops the request:
    /// no ack, no retry, at-most-once semantics.
    fn handle(
        &self,
        next: &str,
        tag: &str,
        input: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Accepts connections forever, one task per inbound connection.
pub async fn serve<H: ForwardHandler>(listener: TcpListener, handler: Arc<H>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            let (rx, tx) = stream.into_split();
            if let Err(e) = handle_conn(rx, tx, handler.as_ref()).await {
                warn!("connection error from {peer}: {e}");
            }
        });
    }
}

/// Serves one connection until the peer hangs up.
///
/// A `forward` call is acked once the handler finished, which for a stage
/// means once computation is done; downstream forwards keep running in the
/// background. Any other operation name is answered with an `Err` frame.
/// Handler faults are logged and the request is dropped without an ack.
pub async fn handle_conn<R, W, H>(rx: R, tx: W, handler: &H) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: ForwardHandler,
{
    let (mut rx, mut tx) = comms::channel(rx, tx);
    let mut buf = Vec::new();

    loop {
        let msg = match rx.recv_into::<Msg>(&mut buf).await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        match msg {
            Msg::Call(req) if req.op == FORWARD_OP => {
                debug!("forward call received: next={} tag={}", req.next, req.tag);

                match handler.handle(&req.next, &req.tag, req.input).await {
                    Ok(()) => tx.send(&Msg::Ack).await?,
                    Err(e) => {
                        warn!("request dropped: next={} tag={} {e}", req.next, req.tag);
                        return Ok(());
                    }
                }
            }
            Msg::Call(req) => {
                warn!("rejected unknown operation {:?}", req.op);
                let detail = format!("unknown operation: {}", req.op);
                tx.send(&Msg::Err(detail.into())).await?;
            }
            other => {
                warn!("unexpected frame on serving side: {other:?}");
                return Ok(());
            }
        }
    }
}
