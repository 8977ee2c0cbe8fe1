use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use uuid::Uuid;

/// Background operations that can be deduplicated per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Render,
    Summarize,
    Chat,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Render => write!(f, "render"),
            OperationKind::Summarize => write!(f, "summarize"),
            OperationKind::Chat => write!(f, "chat"),
        }
    }
}

type FlightKey = (OperationKind, Uuid);

/// Single-flight table: at most one in-flight operation per `(kind, resource)` pair.
///
/// Acquisition never blocks. A caller that fails to acquire is expected to drop its request.
#[derive(Clone, Default)]
pub struct InFlight {
    busy: Arc<Mutex<HashSet<FlightKey>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(kind, resource)` busy, or return `None` if it already is.
    pub fn try_acquire(&self, kind: OperationKind, resource: Uuid) -> Option<InFlightPermit> {
        let key = (kind, resource);
        if !self.lock().insert(key) {
            return None;
        }
        Some(InFlightPermit {
            table: self.clone(),
            key,
        })
    }

    pub fn is_busy(&self, kind: OperationKind, resource: Uuid) -> bool {
        self.lock().contains(&(kind, resource))
    }

    fn release(&self, key: &FlightKey) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<FlightKey>> {
        // Every update is a single set call, so a poisoned set is still consistent.
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps its slot busy until dropped.
pub struct InFlightPermit {
    table: InFlight,
    key: FlightKey,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.table.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[test]
    fn second_acquire_fails_until_release() {
        let table = InFlight::new();
        let doc = Uuid::new_v4();

        let permit = table.try_acquire(OperationKind::Render, doc).expect("first acquire");
        assert!(table.try_acquire(OperationKind::Render, doc).is_none());
        assert!(table.is_busy(OperationKind::Render, doc));

        drop(permit);
        assert!(!table.is_busy(OperationKind::Render, doc));
        assert!(table.try_acquire(OperationKind::Render, doc).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let table = InFlight::new();
        let doc = Uuid::new_v4();
        let _render = table.try_acquire(OperationKind::Render, doc).unwrap();
        assert!(table.try_acquire(OperationKind::Summarize, doc).is_some());
        assert!(table.try_acquire(OperationKind::Render, Uuid::new_v4()).is_some());
    }

    #[tokio::test]
    async fn concurrent_duplicate_body_never_runs() {
        let table = InFlight::new();
        let doc = Uuid::new_v4();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = {
            let table = table.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                if let Some(_permit) = table.try_acquire(OperationKind::Render, doc) {
                    runs.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    release_rx.await.unwrap();
                }
            })
        };
        started_rx.await.unwrap();

        let second = {
            let table = table.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                if let Some(_permit) = table.try_acquire(OperationKind::Render, doc) {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        second.await.unwrap();

        release_tx.send(()).unwrap();
        first.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!table.is_busy(OperationKind::Render, doc));
    }
}
