//! Save-time reconciliation of a draft against the server.
//!
//! The server's collection is brought in line with the draft by three
//! sequential phases: delete, update, create. Each call is best-effort; a
//! failing call is logged and recorded and the rest still run. Nothing is
//! rolled back, so after a partial failure the server holds whatever
//! succeeded and the report says what did not.
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{ApiError, RemoteCollection};
use crate::draft::DraftCollection;
use crate::model::{strip_server_keys, Fields, ParentRef, RemoteItem, ORDER_KEY};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("draft belongs to {draft} but was saved against {requested}")]
    ParentMismatch { draft: ParentRef, requested: ParentRef },
    #[error("failed to fetch current collection: {0}")]
    Snapshot(#[source] ApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub index: usize,
    pub remote_id: i64,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCreate {
    pub index: usize,
    pub fields: Fields,
}

/// Calls needed to make the server's collection equal the draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub deletes: Vec<i64>,
    pub updates: Vec<PlannedUpdate>,
    pub creates: Vec<PlannedCreate>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.creates.is_empty()
    }
}

/// Fields sent for the item at `index`: server keys dropped, draft position
/// stamped so `Reorder` persists.
fn outgoing_fields(index: usize, fields: &Fields) -> Fields {
    let mut out = strip_server_keys(fields);
    out.insert(ORDER_KEY.to_string(), Value::from(index as i64));
    out
}

/// Diff the draft against a freshly fetched snapshot.
///
/// Updates are unconditional: every existing item is sent, changed or not.
pub fn plan(snapshot: &[RemoteItem], draft: &DraftCollection) -> Plan {
    let kept: HashSet<i64> = draft.remote_ids().collect();
    let mut seen = HashSet::new();
    let deletes = snapshot
        .iter()
        .map(|item| item.id)
        .filter(|id| !kept.contains(id) && seen.insert(*id))
        .collect();

    let mut updates = Vec::new();
    let mut creates = Vec::new();
    for (index, item) in draft.items().iter().enumerate() {
        let fields = outgoing_fields(index, &item.fields);
        match item.remote_id() {
            Some(remote_id) => updates.push(PlannedUpdate {
                index,
                remote_id,
                fields,
            }),
            None => creates.push(PlannedCreate { index, fields }),
        }
    }

    Plan {
        deletes,
        updates,
        creates,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Delete { remote_id: i64 },
    Update { remote_id: i64 },
    Create { index: usize },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete { remote_id } => write!(f, "delete #{}", remote_id),
            Operation::Update { remote_id } => write!(f, "update #{}", remote_id),
            Operation::Create { index } => write!(f, "create item {}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub operation: Operation,
    pub error: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: Vec<i64>,
    pub updated: Vec<i64>,
    pub created: Vec<i64>,
    pub failures: Vec<CallFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.updated.len() + self.created.len() + self.failures.len()
    }

    fn fail(&mut self, operation: Operation, error: ApiError) {
        warn!(%operation, %error, "reconcile call failed; continuing");
        self.failures.push(CallFailure {
            operation,
            error: error.to_string(),
        });
    }
}

/// Bring the server's collection under `parent` in line with `draft`.
///
/// Only a failed snapshot fetch or a parent mismatch aborts; per-item
/// failures land in the report. Items created here are marked existing in
/// the draft with the id the server returned.
#[instrument(skip_all, fields(parent = %parent, kind = %draft.kind()))]
pub async fn reconcile(
    remote: &dyn RemoteCollection,
    parent: &ParentRef,
    draft: &mut DraftCollection,
) -> Result<ReconcileReport, ReconcileError> {
    match draft.parent() {
        Some(bound) if bound != parent => {
            return Err(ReconcileError::ParentMismatch {
                draft: bound.clone(),
                requested: parent.clone(),
            })
        }
        Some(_) => {}
        None => draft.bind_parent(parent.clone()),
    }

    let kind = draft.kind();
    let snapshot = remote
        .list(parent, kind)
        .await
        .map_err(ReconcileError::Snapshot)?;
    let plan = plan(&snapshot, draft);
    let mut report = ReconcileReport::default();

    for remote_id in plan.deletes {
        match remote.delete(parent, kind, remote_id).await {
            Ok(()) => report.deleted.push(remote_id),
            Err(err) => report.fail(Operation::Delete { remote_id }, err),
        }
    }

    for update in plan.updates {
        let remote_id = update.remote_id;
        match remote.update(parent, kind, remote_id, &update.fields).await {
            Ok(()) => report.updated.push(remote_id),
            Err(err) => report.fail(Operation::Update { remote_id }, err),
        }
    }

    for create in plan.creates {
        match remote.create(parent, kind, &create.fields).await {
            Ok(item) => {
                draft.mark_created(create.index, item.id);
                report.created.push(item.id);
            }
            Err(err) => report.fail(Operation::Create { index: create.index }, err),
        }
    }

    info!(
        deleted = report.deleted.len(),
        updated = report.updated.len(),
        created = report.created.len(),
        failed = report.failures.len(),
        "reconcile finished"
    );
    Ok(report)
}
