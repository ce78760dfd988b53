//! Client side of the single-operation pipeline RPC.

use std::io;

use tokio::net::TcpStream;

use crate::msg::{ForwardRequest, Msg};

/// Issues exactly one `forward` call against `addr` and awaits the ack.
///
/// A fresh connection is opened for every call and dropped once the reply
/// arrives, so the full connection setup cost sits inside the round trip
/// the caller measures.
///
/// # Arguments
/// * `addr` - The `host:port` of the next replica.
/// * `req` - The request to deliver, consumed by the call.
///
/// # Returns
/// `Ok(())` once the remote acked. A remote `Err` frame is surfaced as an
/// `io::Error` carrying the remote detail.
pub async fn forward(addr: &str, req: ForwardRequest<'_>) -> io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = crate::channel(rx, tx);

    let msg = Msg::Call(req);
    tx.send(&msg).await?;

    let mut buf = Vec::new();
    match rx.recv_into(&mut buf).await? {
        Msg::Ack => Ok(()),
        Msg::Err(detail) => Err(io::Error::other(format!(
            "forward rejected by {addr}: {detail}"
        ))),
        Msg::Call(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected call frame in reply",
        )),
    }
}
