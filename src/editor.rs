//! Editor sessions: own the active draft and drive it against the backend.
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::{ApiError, PackageStore, RemoteCollection};
use crate::config::RemovalPolicy;
use crate::draft::{Command, DraftCollection, DraftError, Effect};
use crate::model::{Package, PackageForm, ParentRef, SubResource};
use crate::reconcile::{reconcile, ReconcileError, ReconcileReport};
use crate::render::{render, DraftView};
use crate::validation::{validate_package, ValidationError};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no draft is open")]
    NoActiveDraft,
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Result of saving one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub kind: SubResource,
    pub report: ReconcileReport,
}

impl SaveOutcome {
    pub fn is_clean(&self) -> bool {
        self.report.is_clean()
    }

    /// One-line summary for the user.
    pub fn notification(&self) -> String {
        let r = &self.report;
        if r.is_clean() {
            format!(
                "Saved {}: {} created, {} updated, {} deleted",
                self.kind,
                r.created.len(),
                r.updated.len(),
                r.deleted.len()
            )
        } else {
            format!(
                "Saved {} with errors: {} of {} changes failed",
                self.kind,
                r.failures.len(),
                r.attempted()
            )
        }
    }
}

/// Holds at most one draft at a time. Opening another collection discards
/// the previous draft.
pub struct EditorSession<'a> {
    id: Uuid,
    remote: &'a dyn RemoteCollection,
    policy: RemovalPolicy,
    draft: Option<DraftCollection>,
}

impl<'a> EditorSession<'a> {
    pub fn new(remote: &'a dyn RemoteCollection, policy: RemovalPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote,
            policy,
            draft: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn draft(&self) -> Option<&DraftCollection> {
        self.draft.as_ref()
    }

    pub fn view(&self) -> Option<DraftView> {
        self.draft.as_ref().map(render)
    }

    /// Load the server's items for `parent` into a fresh draft.
    #[instrument(skip_all, fields(session = %self.id, parent = %parent, kind = %kind))]
    pub async fn open(&mut self, parent: ParentRef, kind: SubResource) -> Result<DraftView, EditorError> {
        if self.draft.take().is_some() {
            debug!("discarding previous draft");
        }
        let items = self.remote.list(&parent, kind).await?;
        let draft = DraftCollection::from_remote(parent, kind, &items);
        info!(items = draft.len(), "draft opened");
        let view = render(&draft);
        self.draft = Some(draft);
        Ok(view)
    }

    /// Empty draft for a parent that will be created on submit.
    pub fn start_new(&mut self, kind: SubResource) -> DraftView {
        let draft = DraftCollection::new(kind);
        let view = render(&draft);
        self.draft = Some(draft);
        view
    }

    pub fn close(&mut self) -> Option<DraftCollection> {
        self.draft.take()
    }

    /// Apply one command and return the re-rendered draft.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn dispatch(&mut self, command: Command) -> Result<DraftView, EditorError> {
        let draft = self.draft.as_mut().ok_or(EditorError::NoActiveDraft)?;
        let effect = draft.apply(command)?;

        if let Effect::RemovedExisting(remote_id) = effect {
            match (self.policy, draft.parent()) {
                (RemovalPolicy::Immediate, Some(parent)) => {
                    // On failure the item is still in the remote snapshot, so
                    // the save-time delete phase picks it up again.
                    match self.remote.delete(parent, draft.kind(), remote_id).await {
                        Ok(()) => info!(remote_id, "deleted removed item"),
                        Err(err) => warn!(%err, remote_id, "immediate delete failed; will retry on save"),
                    }
                }
                _ => debug!(remote_id, "delete deferred to save"),
            }
        }

        Ok(render(draft))
    }

    /// Reconcile the draft with the server. The draft is cleared only when
    /// every call succeeded; otherwise it stays open for another attempt.
    #[instrument(skip_all, fields(session = %self.id, parent = %parent))]
    pub async fn save(&mut self, parent: &ParentRef) -> Result<SaveOutcome, EditorError> {
        let draft = self.draft.as_mut().ok_or(EditorError::NoActiveDraft)?;
        let kind = draft.kind();
        let report = reconcile(self.remote, parent, draft).await?;
        let outcome = SaveOutcome { kind, report };
        if outcome.is_clean() {
            self.draft = None;
            info!("{}", outcome.notification());
        } else {
            warn!("{}", outcome.notification());
        }
        Ok(outcome)
    }
}

/// Result of submitting a package form with its drafts.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub package: Package,
    pub saved: Vec<SaveOutcome>,
    /// Drafts whose reconciliation could not start (e.g. snapshot fetch failed).
    pub aborted: Vec<(SubResource, String)>,
}

impl SubmitOutcome {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty() && self.saved.iter().all(SaveOutcome::is_clean)
    }

    pub fn notification(&self) -> String {
        let title = &self.package.form.title;
        if self.is_clean() {
            return format!("Package '{}' saved", title);
        }
        let mut failed: Vec<String> = self
            .saved
            .iter()
            .filter(|o| !o.is_clean())
            .map(|o| format!("{} ({} failed)", o.kind, o.report.failures.len()))
            .collect();
        failed.extend(self.aborted.iter().map(|(kind, _)| format!("{} (not saved)", kind)));
        format!("Package '{}' saved, but some changes failed: {}", title, failed.join(", "))
    }
}

/// Package form plus one draft session per sub-resource kind being edited.
/// The package itself is written first; drafts are reconciled afterwards as
/// best-effort enrichment and never undo the package write.
pub struct PackageEditor<'a> {
    store: &'a dyn PackageStore,
    remote: &'a dyn RemoteCollection,
    policy: RemovalPolicy,
    package_id: Option<i64>,
    sessions: BTreeMap<SubResource, EditorSession<'a>>,
}

impl<'a> PackageEditor<'a> {
    /// Editor for a package that does not exist yet.
    pub fn create(store: &'a dyn PackageStore, remote: &'a dyn RemoteCollection, policy: RemovalPolicy) -> Self {
        Self {
            store,
            remote,
            policy,
            package_id: None,
            sessions: BTreeMap::new(),
        }
    }

    /// Editor for an existing package.
    pub fn edit(
        store: &'a dyn PackageStore,
        remote: &'a dyn RemoteCollection,
        policy: RemovalPolicy,
        package_id: i64,
    ) -> Self {
        Self {
            package_id: Some(package_id),
            ..Self::create(store, remote, policy)
        }
    }

    pub fn package_id(&self) -> Option<i64> {
        self.package_id
    }

    /// Session for `kind`. Its draft is opened on first use and reopened
    /// from the server after a clean save cleared it.
    pub async fn session(&mut self, kind: SubResource) -> Result<&mut EditorSession<'a>, EditorError> {
        let (remote, policy, package_id) = (self.remote, self.policy, self.package_id);
        let session = self
            .sessions
            .entry(kind)
            .or_insert_with(|| EditorSession::new(remote, policy));
        if session.draft().is_none() {
            match package_id {
                Some(id) => {
                    session.open(ParentRef::package(id), kind).await?;
                }
                None => {
                    session.start_new(kind);
                }
            }
        }
        Ok(session)
    }

    pub async fn dispatch(&mut self, kind: SubResource, command: Command) -> Result<DraftView, EditorError> {
        self.session(kind).await?.dispatch(command).await
    }

    /// Validate and write the package, then reconcile every open draft.
    #[instrument(skip_all, fields(package_id = ?self.package_id))]
    pub async fn submit(&mut self, form: &PackageForm) -> Result<SubmitOutcome, EditorError> {
        validate_package(form)?;
        let package = match self.package_id {
            Some(id) => self.store.update_package(id, form).await?,
            None => self.store.create_package(form).await?,
        };
        info!(package_id = package.id, "package saved");
        self.package_id = Some(package.id);

        let parent = ParentRef::package(package.id);
        let mut saved = Vec::new();
        let mut aborted = Vec::new();
        for (kind, session) in self.sessions.iter_mut() {
            if session.draft().is_none() {
                continue;
            }
            match session.save(&parent).await {
                Ok(outcome) => saved.push(outcome),
                Err(err) => {
                    warn!(%err, %kind, "draft not saved");
                    aborted.push((*kind, err.to_string()));
                }
            }
        }

        Ok(SubmitOutcome {
            package,
            saved,
            aborted,
        })
    }
}
