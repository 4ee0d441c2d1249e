use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reactor_http::connection::{Connection, MessageReader, ReaderConfig};
use reactor_http::handler::MessageHandler;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::{ServerConfig, TlsConfig};
use crate::dispatch::RequestHandler;
use crate::error::ServerError;
use crate::reactor::ReactorGroup;
use crate::service::Service;
use crate::tls::{Transport, load_acceptor};

/// How long `stop(true)` sleeps between checks of the live connections.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A multi reactor HTTP/1.x server.
///
/// Every reactor runs an accept loop on the same listening socket. Accepted connections are
/// handed to the reactors in turn, so the group shares them round-robin whichever loop
/// accepted them. A connection stays on its reactor for its whole life. The server is driven from plain
/// threads: [`start`](Server::start) returns once listening, [`join`](Server::join) blocks
/// until another thread calls [`stop`](Server::stop).
///
/// ```no_run
/// use reactor_http::connection::Connection;
/// use reactor_http::handler::MessageHandler;
/// use reactor_http::protocol::ParsedMessage;
/// use reactor_server::{Server, ServerConfig, Transport};
///
/// struct Ignore;
///
/// impl MessageHandler<Transport> for Ignore {
///     async fn on_message_complete(&self, _message: ParsedMessage, conn: &mut Connection<Transport>) {
///         let _ = conn.close().await;
///     }
/// }
///
/// let server = Server::new(ServerConfig::default(), Ignore).unwrap();
/// server.start().unwrap();
/// server.join();
/// ```
pub struct Server<H> {
    inner: Arc<ServerInner<H>>,
}

struct ServerInner<H> {
    config: ServerConfig,
    reader_config: ReaderConfig,
    handler: H,
    tls: Option<TlsAcceptor>,
    listening: AtomicBool,
    next_reactor: AtomicUsize,
    state: Mutex<ServerState>,
    stopped: Condvar,
    pool: ConnectionPool,
}

struct ServerState {
    reactors: ReactorGroup,
    token: Option<CancellationToken>,
    local_addr: Option<SocketAddr>,
}

impl<V, A> Server<RequestHandler<V, A>>
where
    V: Service + Send + Sync + 'static,
    A: Authenticator + 'static,
{
    /// A server dispatching every request to `service`, guarded by `authenticator`.
    pub fn with_service(config: ServerConfig, service: V, authenticator: A) -> Result<Self, ServerError> {
        Self::new(config, RequestHandler::new(service, authenticator))
    }
}

impl<H> Server<H>
where
    H: MessageHandler<Transport> + Send + Sync + 'static,
{
    /// Creates a stopped server. TLS material, if configured, is loaded here.
    pub fn new(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(load_acceptor).transpose()?;
        let reactors = ReactorGroup::new(config.reactors, config.threads_per_reactor);

        Ok(Self {
            inner: Arc::new(ServerInner {
                reader_config: config.reader_config(),
                config,
                handler,
                tls,
                listening: AtomicBool::new(false),
                next_reactor: AtomicUsize::new(0),
                state: Mutex::new(ServerState { reactors, token: None, local_addr: None }),
                stopped: Condvar::new(),
                pool: ConnectionPool::default(),
            }),
        })
    }

    /// Binds the listening socket and starts the reactors with their accept loops.
    ///
    /// Does nothing if the server is already listening.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or a reactor cannot be started. Nothing keeps
    /// running in that case. Fails with [`ServerError::AlreadyRunning`] while a stop is still
    /// draining connections.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut state = self.inner.lock_state();
        if self.inner.is_listening() {
            return Ok(());
        }
        if state.reactors.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let address = &self.inner.config.address;
        let listener = std::net::TcpListener::bind(address).map_err(|e| ServerError::bind(address, e))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let handles: Arc<[Handle]> = state.reactors.start()?.into();
        let token = CancellationToken::new();
        self.inner.next_reactor.store(0, Ordering::Relaxed);
        self.inner.listening.store(true, Ordering::Release);

        for (index, handle) in handles.iter().enumerate() {
            let cloned = match listener.try_clone() {
                Ok(cloned) => cloned,
                Err(e) => {
                    self.inner.listening.store(false, Ordering::Release);
                    token.cancel();
                    state.reactors.stop();
                    return Err(e.into());
                }
            };

            let inner = Arc::clone(&self.inner);
            let reactors = Arc::clone(&handles);
            let token = token.clone();
            handle.spawn(async move {
                match TcpListener::from_std(cloned) {
                    Ok(listener) => accept_loop(inner, index, listener, reactors, token).await,
                    Err(e) => error!(reactor = index, cause = %e, "failed to register listener"),
                }
            });
        }

        state.token = Some(token);
        state.local_addr = Some(local_addr);
        info!(%local_addr, reactors = handles.len(), "server listening");
        Ok(())
    }

    /// Stops accepting, optionally waits for the live connections to finish, then stops the
    /// reactors. Connections still waiting for a request are closed right away.
    ///
    /// With `wait` the live set is checked every [`DRAIN_POLL_INTERVAL`], pruning
    /// connections whose task ended without deregistering. The server state stays readable
    /// while draining.
    pub fn stop(&self, wait: bool) {
        {
            let mut state = self.inner.lock_state();
            let was_listening = self.inner.listening.swap(false, Ordering::AcqRel);
            if !was_listening && !state.reactors.is_running() {
                return;
            }
            if let Some(token) = state.token.take() {
                token.cancel();
            }
        }

        if wait {
            self.inner.pool.wait_drained(DRAIN_POLL_INTERVAL);
        }

        let mut state = self.inner.lock_state();
        state.reactors.stop();
        let abandoned = self.inner.pool.clear();
        if abandoned > 0 {
            warn!(abandoned, "connections were dropped by the shutdown");
        }
        state.local_addr = None;

        self.inner.stopped.notify_all();
        info!("server stopped");
    }

    /// Blocks until the server is stopped, drain included.
    pub fn join(&self) {
        let mut state = self.inner.lock_state();
        while self.inner.is_listening() || state.reactors.is_running() {
            state = self.inner.stopped.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.inner.is_listening()
    }

    /// The bound address while listening, with the actual port when port 0 was configured.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock_state().local_addr
    }

    /// Number of connections currently being served.
    pub fn connection_count(&self) -> usize {
        self.inner.pool.len()
    }

    /// Number of connections currently served by each reactor, indexed by reactor.
    pub fn connections_per_reactor(&self) -> Vec<usize> {
        let reactors = self.inner.lock_state().reactors.len();
        self.inner.pool.per_reactor(reactors)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }
}

impl<H> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.inner.config.address)
            .field("listening", &self.inner.is_listening())
            .field("connections", &self.inner.pool.len())
            .finish_non_exhaustive()
    }
}

impl<H> Drop for Server<H> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        self.inner.listening.store(false, Ordering::Release);
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.reactors.stop();
        self.inner.stopped.notify_all();
    }
}

impl<H> ServerInner<H> {
    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn handshake(&self, stream: TcpStream) -> io::Result<Transport> {
        let Some(acceptor) = &self.tls else {
            return Ok(Transport::Plain(stream));
        };

        let accept = acceptor.accept(stream);
        let stream = match self.reader_config.read_timeout {
            Some(duration) => timeout(duration, accept)
                .await
                .unwrap_or_else(|elapsed| Err(io::Error::new(io::ErrorKind::TimedOut, elapsed)))?,
            None => accept.await?,
        };
        Ok(Transport::Tls(Box::new(stream)))
    }
}

async fn accept_loop<H>(
    inner: Arc<ServerInner<H>>,
    reactor: usize,
    listener: TcpListener,
    reactors: Arc<[Handle]>,
    token: CancellationToken,
) where
    H: MessageHandler<Transport> + Send + Sync + 'static,
{
    loop {
        let accepted = tokio::select! {
            () = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                // detached from this reactor's driver, registered again by the one serving it
                let stream = match stream.into_std() {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(cause = %e, %peer, "failed to hand over connection");
                        continue;
                    }
                };
                let target = inner.next_reactor.fetch_add(1, Ordering::Relaxed) % reactors.len();

                // tracked before the task exists, so a stop never misses it
                let ticket = inner.pool.insert(peer, target);
                reactors[target].spawn(serve_connection(Arc::clone(&inner), ticket, stream, token.clone()));
            }
            Err(_) if !inner.is_listening() => break,
            Err(e) => warn!(cause = %e, "failed to accept"),
        }
    }
    debug!(reactor, "accept loop ended");
}

async fn serve_connection<H>(
    inner: Arc<ServerInner<H>>,
    ticket: Arc<ConnectionTicket>,
    stream: std::net::TcpStream,
    token: CancellationToken,
) where
    H: MessageHandler<Transport> + Send + Sync + 'static,
{
    debug!(id = ticket.id, peer = %ticket.peer, reactor = ticket.reactor, "connection accepted");

    let stream = match TcpStream::from_std(stream) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(cause = %e, peer = %ticket.peer, "failed to register connection");
            inner.pool.remove(ticket.id);
            return;
        }
    };

    let transport = match inner.handshake(stream).await {
        Ok(transport) => transport,
        Err(e) => {
            warn!(cause = %e, peer = %ticket.peer, "tls handshake failed");
            inner.pool.remove(ticket.id);
            return;
        }
    };

    let mut conn = Connection::new(transport);
    loop {
        let received = tokio::select! {
            received = MessageReader::request(&inner.reader_config).receive(&mut conn) => received,
            () = token.cancelled() => break,
        };

        match received {
            Ok(message) => inner.handler.on_message_complete(message, &mut conn).await,
            Err(e) if e.is_idle_close() => {
                debug!(id = ticket.id, "peer closed connection");
                break;
            }
            Err(e) => {
                info!(id = ticket.id, cause = %e, "connection ended");
                break;
            }
        }

        if !(inner.is_listening() && conn.is_keep_alive() && conn.is_open() && !conn.is_sending()) {
            break;
        }
    }

    if let Err(e) = conn.close().await {
        debug!(id = ticket.id, cause = %e, "failed to shut down connection");
    }
    inner.pool.remove(ticket.id);
}

#[derive(Debug)]
struct ConnectionTicket {
    id: u64,
    peer: SocketAddr,
    reactor: usize,
}

/// The live connections of a server.
///
/// The connection task holds one clone of its ticket and the pool the other, so a ticket with a
/// strong count of one belongs to a task that ended without removing it.
#[derive(Default)]
struct ConnectionPool {
    live: Mutex<HashMap<u64, Arc<ConnectionTicket>>>,
    drained: Condvar,
    next_id: AtomicU64,
}

impl ConnectionPool {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<ConnectionTicket>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, peer: SocketAddr, reactor: usize) -> Arc<ConnectionTicket> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ticket = Arc::new(ConnectionTicket { id, peer, reactor });

        let mut live = self.lock();
        Self::prune(&mut live);
        live.insert(id, Arc::clone(&ticket));
        ticket
    }

    fn remove(&self, id: u64) {
        let mut live = self.lock();
        live.remove(&id);
        if live.is_empty() {
            self.drained.notify_all();
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn per_reactor(&self, reactors: usize) -> Vec<usize> {
        let mut counts = vec![0; reactors];
        for ticket in self.lock().values() {
            if let Some(count) = counts.get_mut(ticket.reactor) {
                *count += 1;
            }
        }
        counts
    }

    fn wait_drained(&self, poll: Duration) {
        let mut live = self.lock();
        loop {
            Self::prune(&mut live);
            if live.is_empty() {
                return;
            }
            debug!(remaining = live.len(), "waiting for connections to finish");
            live = self.drained.wait_timeout(live, poll).unwrap_or_else(PoisonError::into_inner).0;
        }
    }

    /// Forgets every connection, returning how many were still live.
    fn clear(&self) -> usize {
        let mut live = self.lock();
        let count = live.len();
        live.clear();
        count
    }

    fn prune(live: &mut HashMap<u64, Arc<ConnectionTicket>>) {
        let before = live.len();
        live.retain(|_, ticket| Arc::strong_count(ticket) > 1);
        let orphans = before - live.len();
        if orphans > 0 {
            warn!(orphans, "pruned connections whose task ended early");
        }
    }
}

/// Assembles a [`Server`] from chained settings.
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn address<S: Into<String>>(mut self, address: S) -> Self {
        self.config.address = address.into();
        self
    }

    pub fn reactors(mut self, reactors: usize) -> Self {
        self.config.reactors = reactors;
        self
    }

    pub fn threads_per_reactor(mut self, threads: usize) -> Self {
        self.config.threads_per_reactor = threads;
        self
    }

    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    /// A zero duration disables the read timeout.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.config.read_timeout = read_timeout;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn build<H>(self, handler: H) -> Result<Server<H>, ServerError>
    where
        H: MessageHandler<Transport> + Send + Sync + 'static,
    {
        Server::new(self.config, handler)
    }

    pub fn build_service<V, A>(self, service: V, authenticator: A) -> Result<Server<RequestHandler<V, A>>, ServerError>
    where
        V: Service + Send + Sync + 'static,
        A: Authenticator + 'static,
    {
        Server::with_service(self.config, service, authenticator)
    }
}
