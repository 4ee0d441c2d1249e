use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::error::ServerError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// One event loop and the worker threads running it.
///
/// The runtime exists only between [`start`](Reactor::start) and [`stop`](Reactor::stop), so a
/// stopped reactor can be started again.
#[derive(Debug)]
pub struct Reactor {
    index: usize,
    threads: usize,
    runtime: Option<Runtime>,
}

impl Reactor {
    pub fn new(index: usize, threads: usize) -> Self {
        Self { index, threads: threads.max(1), runtime: None }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Builds the runtime if it is not running yet and returns a handle to spawn on it.
    pub fn start(&mut self) -> Result<Handle, ServerError> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.handle().clone());
        }

        let index = self.index;
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.threads)
            .thread_name(format!("reactor-{index}-worker"))
            .enable_all()
            .build()
            .map_err(|source| ServerError::Runtime { source })?;

        debug!(reactor = index, threads = self.threads, "reactor started");
        let handle = runtime.handle().clone();
        self.runtime = Some(runtime);
        Ok(handle)
    }

    /// Shuts the runtime down, cancelling whatever still runs on it.
    pub fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        // a runtime cannot block while dropped from inside another runtime
        if Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        }
        debug!(reactor = self.index, "reactor stopped");
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A fixed set of reactors, each serving its own share of the accepted connections.
#[derive(Debug)]
pub struct ReactorGroup {
    reactors: Vec<Reactor>,
}

impl ReactorGroup {
    pub fn new(reactors: usize, threads_per_reactor: usize) -> Self {
        let reactors = (0..reactors.max(1)).map(|index| Reactor::new(index, threads_per_reactor)).collect();
        Self { reactors }
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.reactors.iter().any(Reactor::is_running)
    }

    /// Starts every reactor, returning their handles in index order.
    ///
    /// If one reactor fails to start, the ones already started are stopped again.
    pub fn start(&mut self) -> Result<Vec<Handle>, ServerError> {
        let mut handles = Vec::with_capacity(self.reactors.len());
        for reactor in &mut self.reactors {
            match reactor.start() {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
        info!(reactors = handles.len(), "reactor group started");
        Ok(handles)
    }

    pub fn stop(&mut self) {
        for reactor in &mut self.reactors {
            reactor.stop();
        }
    }
}
