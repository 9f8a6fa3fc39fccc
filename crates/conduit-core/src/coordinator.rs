//! Serialises every access to a [`NetworkManager`] behind one exclusive
//! section.
//!
//! Four access modes:
//!
//! - [`Coordinator::run_if_free`]: try-acquire; skipped when busy.
//! - [`Coordinator::run_now`]: block until the section is free.
//! - [`Coordinator::run_sync`]: queue for the next tick that acquires it.
//! - [`Coordinator::run_async`]: queue for the worker thread.
//!
//! The tick itself try-acquires: a busy manager skips the step rather than
//! stalling the caller's loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::debug::{DebugFeed, NetworkTrace};
use crate::error::NetworkFault;
use crate::manager::NetworkManager;

/// Deferred work on the manager.
pub type ManagerTask = Box<dyn FnOnce(&mut NetworkManager) + Send + 'static>;

/// What became of one call to [`Coordinator::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every network ran and the sync queue was drained.
    Completed,
    /// The manager was busy; nothing ran.
    Skipped,
    /// A network faulted. The rest of the step and the sync queue were not run.
    Faulted(NetworkFault),
}

pub struct Coordinator {
    manager: Arc<Mutex<NetworkManager>>,
    sync_tx: Sender<ManagerTask>,
    sync_rx: Receiver<ManagerTask>,
    async_tx: Sender<ManagerTask>,
    async_rx: Receiver<ManagerTask>,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(manager: NetworkManager) -> Self {
        let poll_interval = manager.settings().worker_poll_interval();
        let (sync_tx, sync_rx) = unbounded();
        let (async_tx, async_rx) = unbounded();
        Self {
            manager: Arc::new(Mutex::new(manager)),
            sync_tx,
            sync_rx,
            async_tx,
            async_rx,
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// A handle to the guarded manager, for callers managing their own locking.
    pub fn manager(&self) -> Arc<Mutex<NetworkManager>> {
        Arc::clone(&self.manager)
    }

    pub fn run_if_free<R>(&self, f: impl FnOnce(&mut NetworkManager) -> R) -> Option<R> {
        let mut guard = self.manager.try_lock()?;
        Some(f(&mut *guard))
    }

    pub fn run_now<R>(&self, f: impl FnOnce(&mut NetworkManager) -> R) -> R {
        let mut guard = self.manager.lock();
        f(&mut *guard)
    }

    pub fn run_sync(&self, task: impl FnOnce(&mut NetworkManager) + Send + 'static) {
        if self.sync_tx.send(Box::new(task)).is_err() {
            warn!("sync queue closed, task dropped");
        }
    }

    pub fn run_async(&self, task: impl FnOnce(&mut NetworkManager) + Send + 'static) {
        if self.async_tx.send(Box::new(task)).is_err() {
            warn!("async queue closed, task dropped");
        }
    }

    pub fn pending_sync(&self) -> usize {
        self.sync_rx.len()
    }

    pub fn pending_async(&self) -> usize {
        self.async_rx.len()
    }

    /// Run one manager step if the section is free, then drain the sync queue.
    pub fn tick(&self) -> TickOutcome {
        let Some(mut guard) = self.manager.try_lock() else {
            warn!("manager busy, tick skipped");
            return TickOutcome::Skipped;
        };

        if let Err(fault) = guard.tick() {
            error!(%fault, tick = guard.current_tick(), "network tick faulted");
            return TickOutcome::Faulted(fault);
        }

        while let Ok(task) = self.sync_rx.try_recv() {
            task(&mut *guard);
        }
        TickOutcome::Completed
    }

    /// Poll the debug feed unless a step is in progress.
    pub fn poll_debug(&self, feed: &DebugFeed) -> Option<Vec<NetworkTrace>> {
        self.run_if_free(|manager| feed.poll(manager))
    }

    /// Start the thread that drains the async queue. Calling it again while
    /// the worker runs does nothing.
    pub fn spawn_worker(&mut self) -> std::io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let manager = Arc::clone(&self.manager);
        let tasks = self.async_rx.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let poll_interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("conduit-worker".into())
            .spawn(move || worker_loop(manager, tasks, shutdown, poll_interval))?;
        self.worker = Some(handle);
        debug!("async worker started");
        Ok(())
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker after its current task and wait for it. Queued tasks
    /// stay queued.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("async worker panicked");
            }
            debug!("async worker stopped");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    manager: Arc<Mutex<NetworkManager>>,
    tasks: Receiver<ManagerTask>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match tasks.recv_timeout(poll_interval) {
            Ok(task) => {
                let mut guard = manager.lock();
                task(&mut *guard);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
