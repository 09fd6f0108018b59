//! Per-operation aggregation of field accesses into one audit entry.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::store::{AuditStore, AuditStoreError};

/// Kind of access made to a protected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Read,
    Write,
}

impl AccessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record an operation touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTarget {
    pub model: String,
    pub record_id: String,
}

impl AuditTarget {
    pub fn new(model: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            record_id: record_id.into(),
        }
    }
}

/// One persisted audit record, covering every protected field touched by a
/// single logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// `None` for unauthenticated or system callers.
    pub actor_id: Option<String>,
    /// `write` if any field was written, otherwise `read`.
    pub action: AccessAction,
    pub model: String,
    pub record_id: String,
    /// Distinct field names, sorted.
    pub fields: Vec<String>,
    pub origin_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Errors produced by the audit recorder.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The store rejected the entry. Nothing was recorded and the operation
    /// is still open.
    #[error("audit entry could not be persisted: {0}")]
    Persistence(#[from] AuditStoreError),

    #[error("operation has already been flushed")]
    AlreadyFlushed,
}

/// Result of a successful [`Operation::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Recorded(AuditEntry),
    /// No protected field was touched; nothing was written.
    NothingToRecord,
}

/// Lifecycle of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Open,
    Flushed,
}

/// Hands out [`Operation`] handles that share one [`AuditStore`].
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Start collecting accesses for one logical operation on `target`.
    pub fn begin_operation(&self, target: AuditTarget) -> Operation {
        Operation {
            id: Uuid::new_v4(),
            store: Arc::clone(&self.store),
            target,
            accesses: BTreeSet::new(),
            state: OperationState::Open,
        }
    }
}

/// Audit handle for one logical operation (one request, one job).
///
/// Not shared between operations. Accesses are deduplicated per
/// `(field, action)`; [`Operation::flush`] writes at most one entry. The
/// entry id is fixed when the operation begins, so a flush retried after a
/// store failure carries the same id as the attempt that failed.
pub struct Operation {
    id: Uuid,
    store: Arc<dyn AuditStore>,
    target: AuditTarget,
    accesses: BTreeSet<(String, AccessAction)>,
    state: OperationState,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("accesses", &self.accesses)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// Id the entry for this operation is persisted under.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &AuditTarget {
        &self.target
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Whether no access has been noted yet.
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    /// Note that `field` was read or written. Noting the same pair twice has
    /// no further effect.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyFlushed`] once the operation is flushed.
    pub fn note_access(&mut self, field: &str, action: AccessAction) -> Result<(), AuditError> {
        if self.state == OperationState::Flushed {
            return Err(AuditError::AlreadyFlushed);
        }
        self.accesses.insert((field.to_owned(), action));
        Ok(())
    }

    /// Persist one entry summarizing every noted access and close the
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyFlushed`] on a second call, and
    /// [`AuditError::Persistence`] if the store fails, in which case the
    /// operation stays open and may be flushed again.
    pub fn flush(
        &mut self,
        actor_id: Option<&str>,
        origin_ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Result<FlushOutcome, AuditError> {
        if self.state == OperationState::Flushed {
            return Err(AuditError::AlreadyFlushed);
        }
        if self.accesses.is_empty() {
            self.state = OperationState::Flushed;
            return Ok(FlushOutcome::NothingToRecord);
        }

        let entry = self.entry(actor_id, origin_ip, user_agent);
        self.store.persist(&entry)?;
        self.state = OperationState::Flushed;

        info!(
            audit_id = %entry.id,
            action = %entry.action,
            model = %entry.model,
            record_id = %entry.record_id,
            fields = entry.fields.len(),
            "audit entry recorded"
        );
        Ok(FlushOutcome::Recorded(entry))
    }

    fn entry(
        &self,
        actor_id: Option<&str>,
        origin_ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> AuditEntry {
        let action = if self.accesses.iter().any(|(_, a)| *a == AccessAction::Write) {
            AccessAction::Write
        } else {
            AccessAction::Read
        };
        let mut fields: Vec<String> = self.accesses.iter().map(|(f, _)| f.clone()).collect();
        fields.dedup();

        AuditEntry {
            id: self.id,
            actor_id: actor_id.map(str::to_owned),
            action,
            model: self.target.model.clone(),
            record_id: self.target.record_id.clone(),
            fields,
            origin_ip,
            user_agent: user_agent.map(str::to_owned),
            timestamp: Utc::now(),
        }
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if self.state == OperationState::Open && !self.accesses.is_empty() {
            warn!(
                model = %self.target.model,
                record_id = %self.target.record_id,
                accesses = self.accesses.len(),
                "operation dropped without a recorded audit entry"
            );
        }
    }
}
