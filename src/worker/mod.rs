use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Echo loop for one session. Owns the session for its whole lifetime and
/// releases TLS state and socket together on exit, whichever branch ends
/// the loop.
pub async fn run<S>(mut session: S, peer: SocketAddr, recv_buffer_size: usize)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(%peer, "worker started");

    let mut buf = vec![0u8; recv_buffer_size];
    loop {
        let received = match session.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                // peer reset or TLS-level failure, normal termination
                debug!(%peer, error = %e, "receive ended session");
                break;
            }
        };

        match session.write(&buf[..received]).await {
            Ok(sent) if sent == received => {}
            Ok(sent) => {
                warn!(%peer, sent, received, "short write, aborting session");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "send failed, aborting session");
                break;
            }
        }
    }

    // close_notify, then socket and TLS state drop together
    let _ = session.shutdown().await;
    debug!(%peer, "worker stopped");
}
