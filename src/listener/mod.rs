use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::tls::TlsContext;
use crate::worker;

/// Every setup step and the accept call get their own variant so fatal logs
/// name the failing operation.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("socket creation failed: {0}")]
    Socket(std::io::Error),
    #[error("keep-alive configuration failed: {0}")]
    KeepAlive(std::io::Error),
    #[error("bind to port {0} failed: {1}")]
    Bind(u16, std::io::Error),
    #[error("listen failed: {0}")]
    Listen(std::io::Error),
    #[error("runtime registration failed: {0}")]
    Registration(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
    #[error("TLS session with {0} failed: {1}")]
    Handshake(SocketAddr, std::io::Error),
}

/// Owns the listening socket and the shared TLS context; runs the accept
/// loop and hands each established session to its own worker task.
pub struct Listener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
    session_slots: Arc<Semaphore>,
    recv_buffer_size: usize,
}

impl Listener {
    /// Bind to all interfaces on the configured port with keep-alive enabled
    /// and the configured backlog.
    pub fn bind(config: &ServerConfig, ctx: &TlsContext) -> Result<Self, ListenerError> {
        let socket =
            Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(ListenerError::Socket)?;
        socket.set_keepalive(true).map_err(ListenerError::KeepAlive)?;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
        socket
            .bind(&addr.into())
            .map_err(|e| ListenerError::Bind(config.listen_port, e))?;
        socket.listen(config.backlog).map_err(ListenerError::Listen)?;

        socket.set_nonblocking(true).map_err(ListenerError::Registration)?;
        let std_listener: std::net::TcpListener = socket.into();
        let inner = TcpListener::from_std(std_listener).map_err(ListenerError::Registration)?;

        info!(
            port = config.listen_port,
            backlog = config.backlog,
            max_sessions = config.max_sessions,
            "listener bound"
        );

        Ok(Self {
            inner,
            acceptor: ctx.acceptor(),
            session_slots: Arc::new(Semaphore::new(config.max_sessions)),
            recv_buffer_size: config.recv_buffer_size,
        })
    }

    /// The address actually bound, for configurations using port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept loop. Only ever returns an error:
    /// - accept failure and TLS session failure are fatal to the service;
    /// - session-slot exhaustion drops the one connection and continues.
    pub async fn run(&self) -> Result<(), ListenerError> {
        loop {
            let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
            debug!(%peer, "connection accepted");

            let slot = match self.session_slots.clone().try_acquire_owned() {
                Ok(slot) => slot,
                Err(_) => {
                    warn!(%peer, "no session slot available, dropping connection");
                    continue;
                }
            };

            let session = match self.acceptor.accept(stream).await {
                Ok(session) => session,
                Err(e) => {
                    // dropping the stream closed the raw socket; a failed
                    // session points at the shared context, so give up
                    error!(%peer, error = %e, "TLS session establishment failed");
                    return Err(ListenerError::Handshake(peer, e));
                }
            };

            let buf_size = self.recv_buffer_size;
            tokio::spawn(async move {
                worker::run(session, peer, buf_size).await;
                drop(slot);
            });
        }
    }
}
