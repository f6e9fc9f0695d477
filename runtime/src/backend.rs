//! Backend selection.
//!
//! The [`BackendSelector`] is the one piece of process-wide mutable state
//! outside the stores. It decides at startup whether the primary store is
//! reachable and hands out the active store on every call. The mode is a
//! single atomic; reading it never blocks.
//!
//! Switching to the fallback store is one-way: once in
//! [`BackendMode::Fallback`] the selector never retries the primary on its own.
//! [`BackendSelector::reinitialize`] is the only way back.

use crate::memory::MemoryStore;
use crate::metrics::BackendMetrics;
use rsvp_core::store::{RecordStore, StoreError};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Default time allowed for reaching the primary store.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which store the facades currently target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendMode {
    /// The primary document store
    Primary,
    /// The embedded fallback store
    Fallback,
}

impl BackendMode {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Fallback => 1,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Primary,
            _ => Self::Fallback,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide choice between the primary and the fallback store.
pub struct BackendSelector {
    mode: AtomicU8,
    primary: RwLock<Option<Arc<dyn RecordStore>>>,
    fallback: Arc<dyn RecordStore>,
}

impl BackendSelector {
    /// Selector that only ever uses `fallback`.
    #[must_use]
    pub fn fallback_only(fallback: Arc<dyn RecordStore>) -> Self {
        tracing::info!(backend = fallback.name(), "Using fallback store");
        Self {
            mode: AtomicU8::new(BackendMode::Fallback.as_u8()),
            primary: RwLock::new(None),
            fallback,
        }
    }

    /// Selector over an already connected primary store.
    #[must_use]
    pub fn with_primary(primary: Arc<dyn RecordStore>, fallback: Arc<dyn RecordStore>) -> Self {
        Self {
            mode: AtomicU8::new(BackendMode::Primary.as_u8()),
            primary: RwLock::new(Some(primary)),
            fallback,
        }
    }

    /// Try to reach the primary store within `timeout`.
    ///
    /// On success the selector starts in [`BackendMode::Primary`]. On error or
    /// timeout the failure is logged and the selector starts in
    /// [`BackendMode::Fallback`]; it is never returned to the caller.
    pub async fn initialize<F>(fallback: Arc<dyn RecordStore>, connect: F, timeout: Duration) -> Self
    where
        F: Future<Output = Result<Arc<dyn RecordStore>, StoreError>> + Send,
    {
        let selector = Self {
            mode: AtomicU8::new(BackendMode::Fallback.as_u8()),
            primary: RwLock::new(None),
            fallback,
        };
        selector.reinitialize(connect, timeout).await;
        selector
    }

    /// Explicitly retry the primary store.
    ///
    /// Returns the resulting mode. A failed attempt leaves the selector in
    /// fallback mode.
    pub async fn reinitialize<F>(&self, connect: F, timeout: Duration) -> BackendMode
    where
        F: Future<Output = Result<Arc<dyn RecordStore>, StoreError>> + Send,
    {
        let outcome = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(store)) => match store.ping().await {
                Ok(()) => Ok(store),
                Err(e) => Err(e.to_string()),
            },
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no response within {} ms", timeout.as_millis())),
        };

        match outcome {
            Ok(store) => {
                tracing::info!(backend = store.name(), "Connected to primary store");
                *self.primary.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
                self.mode.store(BackendMode::Primary.as_u8(), Ordering::Release);
                BackendMode::Primary
            }
            Err(reason) => {
                self.fall_back(&reason);
                BackendMode::Fallback
            }
        }
    }

    /// Switch to the fallback store. Has no effect if already there.
    pub fn fall_back(&self, reason: &str) {
        let previous = BackendMode::from_u8(
            self.mode
                .swap(BackendMode::Fallback.as_u8(), Ordering::AcqRel),
        );
        if previous == BackendMode::Primary || self.primary_store().is_none() {
            tracing::warn!(
                %reason,
                backend = self.fallback.name(),
                "Primary store unavailable, using fallback store"
            );
            BackendMetrics::record_fallback();
        }
    }

    /// The active mode.
    #[must_use]
    pub fn mode(&self) -> BackendMode {
        BackendMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// The store for the active mode.
    #[must_use]
    pub fn store(&self) -> Arc<dyn RecordStore> {
        match self.mode() {
            BackendMode::Primary => self
                .primary_store()
                .unwrap_or_else(|| Arc::clone(&self.fallback)),
            BackendMode::Fallback => Arc::clone(&self.fallback),
        }
    }

    fn primary_store(&self) -> Option<Arc<dyn RecordStore>> {
        self.primary
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::fallback_only(Arc::new(MemoryStore::new()))
    }
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("mode", &self.mode())
            .field("fallback", &self.fallback.name())
            .finish_non_exhaustive()
    }
}
