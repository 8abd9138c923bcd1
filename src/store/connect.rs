use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::OnceCell;

use super::StoreError;

/// Connect-once cell for a lazily established resource.
///
/// Concurrent first callers are serialized by the underlying `OnceCell`, so
/// at most one connect future runs at a time. A failed attempt leaves the
/// cell empty and the next caller tries again; the first success is memoized
/// for the life of the process.
pub struct LazyConnection<T> {
    cell: OnceCell<T>,
    attempts: AtomicU64,
}

impl<T> LazyConnection<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            attempts: AtomicU64::new(0),
        }
    }

    pub async fn get_or_connect<F, Fut>(&self, connect: F) -> Result<&T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.cell
            .get_or_try_init(move || async move {
                self.attempts.fetch_add(1, Ordering::Relaxed);
                connect().await
            })
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of underlying connect attempts performed so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl<T> Default for LazyConnection<T> {
    fn default() -> Self {
        Self::new()
    }
}
