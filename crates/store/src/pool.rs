//! Bounded resource pool over the store document.
//!
//! At most `max_connections` holders run at once; acquisition waits at most
//! `acquire_timeout`. Every read and write loads the document fresh. Writers
//! are serialized across load, apply, and persist, so each mutation sees the
//! latest snapshot and no update is lost.

use resguard_config::StoreConfig;
use resguard_core::error::StoreError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::document::{DocumentBackend, InMemoryDocument, JsonFileDocument, StoreDocument};

/// Sizing for a [`StorePool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_connections: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_millis(5000),
        }
    }
}

impl From<&StoreConfig> for PoolOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub active: usize,
    pub waiting: usize,
    pub max: usize,
}

pub struct StorePool {
    backend: Arc<dyn DocumentBackend>,
    semaphore: Arc<Semaphore>,
    write_lock: Mutex<()>,
    options: PoolOptions,
    active: Arc<AtomicUsize>,
    waiting: AtomicUsize,
    closed: AtomicBool,
    released: Arc<Notify>,
}

/// Held while a caller uses the store. Releases its slot on drop.
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
    released: Arc<Notify>,
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

/// Keeps the waiting count honest if an acquisition is cancelled.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StorePool {
    pub fn new(backend: Arc<dyn DocumentBackend>, options: PoolOptions) -> Self {
        debug!(
            backend = backend.name(),
            max = options.max_connections,
            timeout_ms = options.acquire_timeout.as_millis() as u64,
            "Store pool created"
        );
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(options.max_connections)),
            write_lock: Mutex::new(()),
            options,
            active: Arc::new(AtomicUsize::new(0)),
            waiting: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            released: Arc::new(Notify::new()),
        }
    }

    /// Open the JSON-file store described by config.
    pub fn open(config: &StoreConfig) -> Arc<Self> {
        info!(path = %config.path.display(), "Opening store");
        Arc::new(Self::new(
            Arc::new(JsonFileDocument::new(&config.path)),
            PoolOptions::from(config),
        ))
    }

    /// A pool over an in-memory document.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::new(
            Arc::new(InMemoryDocument::new()),
            PoolOptions::default(),
        ))
    }

    /// Wait for a slot, up to the acquire timeout.
    pub async fn acquire(&self) -> Result<PoolGuard, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let started = Instant::now();
        let acquired = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            tokio::time::timeout(
                self.options.acquire_timeout,
                self.semaphore.clone().acquire_owned(),
            )
            .await
        };

        match acquired {
            Ok(Ok(permit)) => {
                self.active.fetch_add(1, Ordering::SeqCst);
                Ok(PoolGuard {
                    _permit: permit,
                    active: self.active.clone(),
                    released: self.released.clone(),
                })
            }
            Ok(Err(_)) => Err(StoreError::Closed),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(waited_ms, status = ?self.status(), "Store pool acquisition timed out");
                Err(StoreError::ConnectionTimeout { waited_ms })
            }
        }
    }

    /// Run `f` against a freshly loaded document.
    pub async fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T, StoreError> {
        let _guard = self.acquire().await?;
        let document = self.backend.load().await?;
        Ok(f(&document))
    }

    /// Load the freshest document, apply `f`, and persist the result.
    ///
    /// Nothing is saved when `f` fails.
    pub async fn write<T>(
        &self,
        f: impl FnOnce(&mut StoreDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.acquire().await?;
        let _serialized = self.write_lock.lock().await;
        let mut document = self.backend.load().await?;
        let out = f(&mut document)?;
        self.backend.save(&document).await?;
        Ok(out)
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            active: self.active.load(Ordering::SeqCst),
            waiting: self.waiting.load(Ordering::SeqCst),
            max: self.options.max_connections,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reject queued and future acquisitions, then wait for active holders.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();

        loop {
            let released = self.released.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            released.await;
        }
        info!("Store pool closed");
    }
}
