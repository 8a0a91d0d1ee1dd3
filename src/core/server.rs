//! Gateway listener lifecycle.
//!
//! [`GatewayServer`] binds the configured address, serves the composed
//! handler over the selected transport and stops exactly once, either from
//! the owning service's after-stop hook or directly.
use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::serve::Listener;
use eyre::Result;
use futures_util::StreamExt;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls_acme::{AcmeConfig, caches::DirCache};
use tls_listener::TlsListener;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::{JoinHandle, JoinSet},
};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::{
    compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt},
    sync::CancellationToken,
};

use crate::{
    config::models::{DEFAULT_SHUTDOWN_TIMEOUT, parse_bind_address},
    core::{
        error::GatewayError,
        lifecycle::Lifecycle,
        stats::Stats,
        transport::{ALPN_PROTOCOLS, AcmeSettings, TransportMode},
    },
    ports::handler::BoxHandler,
};

/// Adapts a stream of accepted connections to axum's [`Listener`].
struct AxumListener<S> {
    stream: S,
    local_addr: SocketAddr,
}

impl<S, I, E> Listener for AxumListener<S>
where
    S: futures_util::Stream<Item = Result<(I, SocketAddr), E>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Io = I;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => return (io, addr),
                Some(Err(e)) => tracing::debug!(error = %e, "accept error"),
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

type ServeTask = JoinHandle<()>;

/// Accept connections until `cancel` fires, then give open connections
/// `drain` to finish their in-flight requests before aborting them.
async fn serve_connections<L>(
    mut listener: L,
    app: axum::Router,
    cancel: CancellationToken,
    drain: Duration,
) where
    L: Listener,
    L::Addr: std::fmt::Debug + 'static,
{
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            (io, remote) = listener.accept() => {
                tracing::trace!(remote = ?remote, "connection accepted");
                let service = TowerToHyperService::new(app.clone());
                let cancel = cancel.clone();
                connections.spawn(async move {
                    let builder = auto::Builder::new(TokioExecutor::new());
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
                    tokio::pin!(conn);
                    let result = tokio::select! {
                        result = conn.as_mut() => result,
                        _ = cancel.cancelled() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        tracing::debug!(remote = ?remote, error = %e, "connection error");
                    }
                });
            }
        }
    }
    drop(listener);

    if !connections.is_empty() {
        tracing::info!(connections = connections.len(), "draining open connections");
    }
    let drained = tokio::time::timeout(drain, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    match drained {
        Ok(()) => tracing::info!("gateway listener drained"),
        Err(_) => {
            tracing::warn!(
                timeout = ?drain,
                connections = connections.len(),
                "drain timeout exceeded, aborting in-flight requests"
            );
            connections.shutdown().await;
        }
    }
}

pub struct GatewayServer {
    address: String,
    transport: TransportMode,
    shutdown_timeout: Duration,
    stats: Option<Arc<Stats>>,
    local_addr: OnceLock<SocketAddr>,
    cancel: CancellationToken,
    task: Mutex<Option<ServeTask>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl GatewayServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            transport: TransportMode::Plain,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            stats: None,
            local_addr: OnceLock::new(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    /// Upper bound on how long `stop` waits for in-flight requests.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Hand ownership of the statistics ticker to the server; it is stopped
    /// together with the listener.
    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address actually bound, available once `start` has returned.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Bind the listener and start serving `handler` in the background.
    pub async fn start(&self, handler: BoxHandler) -> Result<SocketAddr, GatewayError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::AlreadyStarted);
        }

        let addr = parse_bind_address(&self.address).map_err(|e| GatewayError::InvalidAddress {
            address: self.address.clone(),
            reason: e.to_string(),
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                address: self.address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            address: self.address.clone(),
            source,
        })?;
        let _ = self.local_addr.set(local_addr);

        let app = axum::Router::new().fallback_service(handler);
        let cancel = self.cancel.clone();
        let drain = self.shutdown_timeout;

        let task: ServeTask = match &self.transport {
            TransportMode::Plain => tokio::spawn(serve_connections(listener, app, cancel, drain)),
            TransportMode::StaticTls(server_config) => {
                let acceptor = tokio_rustls::TlsAcceptor::from(server_config.clone());
                let listener = AxumListener {
                    stream: TlsListener::new(acceptor, listener),
                    local_addr,
                };
                tokio::spawn(serve_connections(listener, app, cancel, drain))
            }
            TransportMode::Acme(settings) => {
                let listener = acme_listener(settings, listener, local_addr);
                tokio::spawn(serve_connections(listener, app, cancel, drain))
            }
        };

        *self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);

        tracing::info!(
            address = %local_addr,
            transport = self.transport.name(),
            "gateway listening"
        );
        Ok(local_addr)
    }

    /// Stop accepting, drain in-flight requests for at most the shutdown
    /// timeout and abort whatever is still running, then stop the statistics
    /// ticker. Only the first call acts.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(address = %self.address, "stopping gateway listener");
        self.cancel.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let mut result = Ok(());
        if let Some(task) = task {
            if let Err(e) = task.await {
                result = Err(eyre::Report::new(e));
            }
        }

        if let Some(stats) = &self.stats {
            stats.stop().await;
        }
        result
    }

    /// Stop this server when `lifecycle` stops.
    pub fn register_shutdown_hook(self: &Arc<Self>, lifecycle: &Lifecycle) {
        let server = Arc::clone(self);
        lifecycle.after_stop(move || async move { server.stop().await });
    }
}

/// TLS listener whose certificates are issued and renewed through ACME.
/// TLS-ALPN-01 challenges are answered on the same port.
fn acme_listener(
    settings: &AcmeSettings,
    listener: TcpListener,
    local_addr: SocketAddr,
) -> impl Listener<Addr = SocketAddr> {
    let mut config = AcmeConfig::new(settings.hosts.clone())
        .cache_option(Some(DirCache::new(settings.cache_dir.clone())))
        .directory(settings.ca.clone());
    if let Some(contact) = &settings.contact {
        config = config.contact_push(format!("mailto:{contact}"));
    }
    let state = config.state();

    let alpn = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    let incoming = state.incoming(
        TcpListenerStream::new(listener).map(|res| res.map(|s| s.compat())),
        alpn,
    );
    let stream = incoming
        .filter_map(|res| async {
            match res {
                Ok(stream) => {
                    let stream = stream.compat();
                    let addr = stream
                        .get_ref()
                        .get_ref()
                        .0
                        .get_ref()
                        .peer_addr()
                        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
                    Some(Ok::<_, std::io::Error>((stream, addr)))
                }
                Err(e) => {
                    tracing::debug!(error = %e, "TLS accept error");
                    None
                }
            }
        })
        .boxed();

    AxumListener { stream, local_addr }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, time::Instant};

    use axum::body::Body as AxumBody;
    use hyper::{Request, Response};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::Notify,
    };
    use tower::{service_fn, util::BoxCloneSyncService};

    use super::*;

    fn hello() -> BoxHandler {
        BoxCloneSyncService::new(service_fn(|_req: Request<AxumBody>| async {
            Ok::<_, Infallible>(Response::new(AxumBody::from("hello")))
        }))
    }

    async fn get(addr: SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_start_serves_and_stop_closes() {
        let server = Arc::new(GatewayServer::new("127.0.0.1:0"));
        let addr = server.start(hello()).await.unwrap();
        assert_eq!(server.local_addr(), Some(addr));

        let response = get(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("hello"));

        server.stop().await.unwrap();
        assert!(server.is_stopped());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let server = GatewayServer::new(address);
        let err = server.start(hello()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let server = GatewayServer::new("127.0.0.1:0");
        server.start(hello()).await.unwrap();
        assert!(matches!(
            server.start(hello()).await.unwrap_err(),
            GatewayError::AlreadyStarted
        ));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_hook_stops_server_and_stats_once() {
        let stats = Stats::new();
        stats.start();
        let server = Arc::new(GatewayServer::new("127.0.0.1:0").with_stats(stats.clone()));
        server.start(hello()).await.unwrap();

        let lifecycle = Lifecycle::new();
        server.register_shutdown_hook(&lifecycle);
        lifecycle.stop().await.unwrap();
        lifecycle.stop().await.unwrap();

        assert!(server.is_stopped());
        assert!(!stats.is_running());
        // a direct stop after the hook is a no-op
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let server = GatewayServer::new("127.0.0.1:0");
        server.stop().await.unwrap();
        assert!(server.is_stopped());
    }

    /// Handler that signals `entered` and then takes `delay` to answer.
    fn slow(entered: Arc<Notify>, delay: Duration) -> BoxHandler {
        BoxCloneSyncService::new(service_fn(move |_req: Request<AxumBody>| {
            let entered = entered.clone();
            async move {
                entered.notify_one();
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(Response::new(AxumBody::from("finally")))
            }
        }))
    }

    #[tokio::test]
    async fn test_stop_waits_for_requests_within_timeout() {
        let entered = Arc::new(Notify::new());
        let server = GatewayServer::new("127.0.0.1:0").with_shutdown_timeout(Duration::from_secs(5));
        let addr = server
            .start(slow(entered.clone(), Duration::from_millis(100)))
            .await
            .unwrap();

        let client = tokio::spawn(get(addr));
        entered.notified().await;
        server.stop().await.unwrap();

        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("finally"));
    }

    #[tokio::test]
    async fn test_stop_aborts_requests_outliving_timeout() {
        let entered = Arc::new(Notify::new());
        let server =
            GatewayServer::new("127.0.0.1:0").with_shutdown_timeout(Duration::from_millis(200));
        let addr = server
            .start(slow(entered.clone(), Duration::from_secs(30)))
            .await
            .unwrap();

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            let _ = stream.read_to_end(&mut response).await;
            response
        });
        entered.notified().await;

        let stopping = Instant::now();
        server.stop().await.unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(5));

        // the connection is torn down without a response
        let response = tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .expect("connection still open after stop")
            .unwrap();
        assert!(response.is_empty());
    }
}
