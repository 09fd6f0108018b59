//! Access auditing for protected fields.
//!
//! Every logical operation (an HTTP request, a background job) obtains one
//! [`Operation`] from the shared [`AuditRecorder`], notes each protected
//! field it reads or writes, and flushes once at the end. A flush writes a
//! single [`AuditEntry`] listing every field touched, or nothing if no
//! protected field was touched.
//!
//! Entries older than the retention window are pruned by
//! [`retention_task`].

pub mod recorder;
pub mod store;

pub use recorder::{
    AccessAction, AuditEntry, AuditError, AuditRecorder, AuditTarget, FlushOutcome, Operation,
    OperationState,
};
pub use store::{AuditStore, AuditStoreError, JsonlAuditStore, MemoryAuditStore};
#[cfg(test)]
pub use store::MockAuditStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time;
use tracing::{info, warn};

/// Oldest timestamp kept when retaining `retention_days` of history.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now - chrono::Duration::days(i64::from(retention_days))
}

/// Spawn a background task that prunes expired entries every `interval`.
///
/// The first prune runs immediately. Failures are logged and retried on the
/// next tick.
pub fn retention_task(
    store: Arc<dyn AuditStore>,
    retention_days: u32,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let cutoff = retention_cutoff(Utc::now(), retention_days);
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.prune(cutoff)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => info!(removed, %cutoff, "expired audit entries pruned"),
                Ok(Err(e)) => warn!(error = %e, "audit retention prune failed"),
                Err(e) => warn!(error = %e, "audit retention task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn cutoff_is_days_before_now() {
        let now = Utc::now();
        assert_eq!(now - retention_cutoff(now, 365), chrono::Duration::days(365));
        assert_eq!(retention_cutoff(now, 0), now);
    }

    #[tokio::test]
    async fn retention_task_prunes_expired_entries() {
        let store = Arc::new(MemoryAuditStore::new());
        let old = AuditEntry {
            id: Uuid::new_v4(),
            actor_id: None,
            action: AccessAction::Write,
            model: "user".into(),
            record_id: "1".into(),
            fields: vec!["email".into()],
            origin_ip: None,
            user_agent: None,
            timestamp: Utc::now() - chrono::Duration::days(400),
        };
        store.persist(&old).unwrap();

        let handle = retention_task(store.clone(), 365, Duration::from_millis(10));
        for _ in 0..50 {
            if store.is_empty() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(store.is_empty());
    }
}
