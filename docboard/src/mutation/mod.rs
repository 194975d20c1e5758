use crate::document::Document;
use crate::error::{DocboardError, Result};
use crate::store::RecordStore;
use crate::validation::ValidationResult;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ActionState {
    Idle,
    Pending,
    Success,
    Failure(String),
}

/// The shared action dialog: what is being done, to which document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dialog {
    pub kind: ActionKind,
    pub entity: Document,
    pub state: ActionState,
}

/// Result of submitting the dialog.
#[derive(Debug)]
pub enum ActionOutcome {
    Saved(Document),
    Deleted(String),
    /// Field constraints failed; nothing was sent and the dialog is still idle
    Invalid(ValidationResult),
    /// The backend rejected the write; the dialog stays open for a retry
    Failed(DocboardError),
}

/// User-facing notifications
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Notifier that writes through the `log` facade.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }
}

/// Drives create, edit and delete through one dialog.
///
/// Each action moves `idle -> pending -> success | failure`. Success closes
/// the dialog; failure keeps it open with the error message.
pub struct MutationOrchestrator {
    store: Arc<RecordStore>,
    notifier: Arc<dyn Notifier>,
    dialog: Mutex<Option<Dialog>>,
}

impl MutationOrchestrator {
    pub fn new(store: Arc<RecordStore>, notifier: Arc<dyn Notifier>) -> Self {
        MutationOrchestrator {
            store,
            notifier,
            dialog: Mutex::new(None),
        }
    }

    pub fn with_log_notifier(store: Arc<RecordStore>) -> Self {
        Self::new(store, Arc::new(LogNotifier))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Dialog>> {
        self.dialog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the open dialog, if any.
    pub fn dialog(&self) -> Option<Dialog> {
        self.lock().clone()
    }

    pub fn state(&self) -> ActionState {
        self.lock()
            .as_ref()
            .map_or(ActionState::Idle, |d| d.state.clone())
    }

    fn open(&self, kind: ActionKind, entity: Document) -> Result<()> {
        let mut dialog = self.lock();
        if matches!(dialog.as_ref(), Some(d) if d.state == ActionState::Pending) {
            return Err(DocboardError::Mutation(
                "Another action is still in progress".into(),
            ));
        }
        log::debug!("opening {kind:?} dialog for '{}'", entity.id);
        *dialog = Some(Dialog {
            kind,
            entity,
            state: ActionState::Idle,
        });
        Ok(())
    }

    pub fn open_create(&self) -> Result<()> {
        self.open(ActionKind::Create, Document::blank())
    }

    pub fn open_edit(&self, doc: Document) -> Result<()> {
        self.open(ActionKind::Edit, doc)
    }

    pub fn open_delete(&self, doc: Document) -> Result<()> {
        self.open(ActionKind::Delete, doc)
    }

    /// Close the dialog and drop the entity in progress.
    pub fn close(&self) -> Result<()> {
        let mut dialog = self.lock();
        if matches!(dialog.as_ref(), Some(d) if d.state == ActionState::Pending) {
            return Err(DocboardError::Mutation(
                "Cannot close the dialog while an action is in progress".into(),
            ));
        }
        *dialog = None;
        Ok(())
    }

    /// Claim the dialog for one of `kinds`: it must be open and not already
    /// pending. Moves it to `pending` under the same lock and returns its entity.
    fn ready(&self, kinds: &[ActionKind]) -> Result<(ActionKind, Document)> {
        let mut dialog = self.lock();
        let Some(d) = dialog.as_mut() else {
            return Err(DocboardError::Mutation("No action dialog is open".into()));
        };
        if d.state == ActionState::Pending {
            return Err(DocboardError::Mutation(
                "Another action is still in progress".into(),
            ));
        }
        if !kinds.contains(&d.kind) {
            return Err(DocboardError::Mutation(format!(
                "The open dialog is a {:?} dialog",
                d.kind
            )));
        }
        log::debug!("{:?} dialog: {:?} -> Pending", d.kind, d.state);
        d.state = ActionState::Pending;
        Ok((d.kind, d.entity.clone()))
    }

    fn set_state(&self, state: ActionState) {
        if let Some(d) = self.lock().as_mut() {
            log::debug!("{:?} dialog: {:?} -> {state:?}", d.kind, d.state);
            d.state = state;
        }
    }

    /// Save the create or edit form.
    pub async fn submit(&self, mut values: Document) -> Result<ActionOutcome> {
        let (kind, entity) = self.ready(&[ActionKind::Create, ActionKind::Edit])?;
        let pending = PendingGuard::new(self);
        if kind == ActionKind::Edit {
            values.id = entity.id;
        }

        let checked = match self.store.check_document(&values).await {
            Ok(checked) => checked,
            Err(e) => {
                pending.disarm();
                return Ok(self.fail(e));
            }
        };
        if !checked.is_ok() {
            pending.disarm();
            self.set_state(ActionState::Idle);
            log::warn!("{kind:?} rejected by validation: {:?}", checked.errors);
            return Ok(ActionOutcome::Invalid(checked));
        }

        let result = match kind {
            ActionKind::Create => self.store.create_document(&values).await,
            _ => self.store.update_document(&values).await,
        };
        pending.disarm();

        let message = match kind {
            ActionKind::Create => "Document created.",
            _ => "Document updated.",
        };
        Ok(match result {
            Ok(doc) => {
                self.succeed(message);
                ActionOutcome::Saved(doc)
            }
            Err(e) => self.fail(e),
        })
    }

    /// Confirm the delete dialog.
    pub async fn confirm_delete(&self) -> Result<ActionOutcome> {
        let (_, entity) = self.ready(&[ActionKind::Delete])?;
        if entity.id.is_empty() {
            self.set_state(ActionState::Idle);
            return Err(DocboardError::Mutation("No document selected for deletion".into()));
        }

        let pending = PendingGuard::new(self);
        let result = self.store.delete_document(&entity.id).await;
        pending.disarm();

        Ok(match result {
            Ok(id) => {
                self.succeed("Document deleted.");
                ActionOutcome::Deleted(id)
            }
            Err(e) => self.fail(e),
        })
    }

    fn succeed(&self, message: &str) {
        self.set_state(ActionState::Success);
        self.notifier.success(message);
        *self.lock() = None;
    }

    fn fail(&self, error: DocboardError) -> ActionOutcome {
        let message = error.to_string();
        self.set_state(ActionState::Failure(message.clone()));
        self.notifier.error(&message);
        ActionOutcome::Failed(error)
    }
}

/// Held while the dialog is pending. If the action future is dropped before
/// the write resolves, the dialog is left in `failure` rather than stuck pending.
struct PendingGuard<'a> {
    orchestrator: &'a MutationOrchestrator,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(orchestrator: &'a MutationOrchestrator) -> Self {
        PendingGuard {
            orchestrator,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator
                .set_state(ActionState::Failure("Action was interrupted".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::document::tests::document;
    use crate::store::tests::{signed_in_store, SpyBackend};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(bool, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn success(&self, message: &str) {
            self.messages.lock().unwrap().push((true, message.to_string()));
        }

        fn error(&self, message: &str) {
            self.messages.lock().unwrap().push((false, message.to_string()));
        }
    }

    async fn orchestrator(
        backend: Arc<dyn Backend>,
    ) -> (MutationOrchestrator, Arc<RecordStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(signed_in_store(backend).await);
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = MutationOrchestrator::new(store.clone(), notifier.clone());
        (orchestrator, store, notifier)
    }

    fn values(header: &str) -> Document {
        document("", |d| d.header = header.to_string())
    }

    #[tokio::test]
    async fn test_create_success_closes_dialog() {
        let (orchestrator, store, notifier) = orchestrator(Arc::new(SpyBackend::new())).await;
        orchestrator.open_create().unwrap();
        assert_eq!(orchestrator.dialog().unwrap().entity, Document::blank());

        let outcome = orchestrator.submit(values("Quarterly plan")).await.unwrap();
        let ActionOutcome::Saved(doc) = outcome else {
            panic!("expected a saved document, got {outcome:?}");
        };
        assert_eq!(doc.header, "Quarterly plan");
        assert!(orchestrator.dialog().is_none());
        assert_eq!(orchestrator.state(), ActionState::Idle);
        assert_eq!(
            *notifier.messages.lock().unwrap(),
            vec![(true, "Document created.".to_string())]
        );
        assert_eq!(store.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_keeps_entity_id() {
        let (orchestrator, store, notifier) = orchestrator(Arc::new(SpyBackend::new())).await;
        let created = store.create_document(&values("Original")).await.unwrap();

        orchestrator.open_edit(created.clone()).unwrap();
        let outcome = orchestrator.submit(values("Renamed")).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Saved(ref d) if d.id == created.id));

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs[0].header, "Renamed");
        assert_eq!(notifier.messages.lock().unwrap()[0].1, "Document updated.");
    }

    #[tokio::test]
    async fn test_invalid_values_stay_idle_without_notifying() {
        let (orchestrator, _, notifier) =
            orchestrator(Arc::new(SpyBackend::failing("unreachable"))).await;
        orchestrator.open_create().unwrap();

        let outcome = orchestrator.submit(values("x")).await.unwrap();
        let ActionOutcome::Invalid(result) = outcome else {
            panic!("expected validation errors, got {outcome:?}");
        };
        assert!(result.field("header").is_some());
        assert_eq!(orchestrator.state(), ActionState::Idle);
        assert!(orchestrator.dialog().is_some());
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_dialog_open_with_message() {
        let (orchestrator, _, notifier) =
            orchestrator(Arc::new(SpyBackend::failing("duplicate key value"))).await;
        orchestrator.open_create().unwrap();

        let outcome = orchestrator.submit(values("Valid header")).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Failed(DocboardError::Mutation(_))));
        assert_eq!(
            orchestrator.state(),
            ActionState::Failure("duplicate key value".into())
        );
        assert_eq!(orchestrator.dialog().unwrap().kind, ActionKind::Create);
        assert_eq!(
            *notifier.messages.lock().unwrap(),
            vec![(false, "duplicate key value".to_string())]
        );

        orchestrator.close().unwrap();
        assert_eq!(orchestrator.state(), ActionState::Idle);
        assert!(orchestrator.dialog().is_none());
    }

    #[tokio::test]
    async fn test_delete_flow() {
        let (orchestrator, store, notifier) = orchestrator(Arc::new(SpyBackend::new())).await;
        let created = store.create_document(&values("Doomed")).await.unwrap();

        orchestrator.open_delete(created.clone()).unwrap();
        let outcome = orchestrator.confirm_delete().await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Deleted(ref id) if *id == created.id));
        assert!(store.list_documents().await.unwrap().is_empty());
        assert_eq!(notifier.messages.lock().unwrap()[0].1, "Document deleted.");
        assert!(orchestrator.dialog().is_none());
    }

    #[tokio::test]
    async fn test_submit_requires_matching_open_dialog() {
        let (orchestrator, _, _) = orchestrator(Arc::new(SpyBackend::new())).await;
        assert!(orchestrator.submit(values("Nothing open")).await.is_err());
        assert!(orchestrator.confirm_delete().await.is_err());

        orchestrator.open_create().unwrap();
        assert!(orchestrator.confirm_delete().await.is_err());

        orchestrator.open_delete(Document::blank()).unwrap();
        assert!(orchestrator.confirm_delete().await.is_err());
    }

    #[tokio::test]
    async fn test_pending_dialog_rejects_reentry() {
        let (orchestrator, _, _) = orchestrator(Arc::new(SpyBackend::new())).await;
        orchestrator.open_create().unwrap();
        orchestrator.set_state(ActionState::Pending);

        assert!(orchestrator.submit(values("Second submit")).await.is_err());
        assert!(orchestrator.close().is_err());
        assert!(orchestrator.open_create().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_submits_only_one_runs() {
        let (orchestrator, store, notifier) = orchestrator(Arc::new(SpyBackend::new())).await;
        orchestrator.open_create().unwrap();

        let (first, second) = tokio::join!(
            orchestrator.submit(values("First submit")),
            orchestrator.submit(values("Second submit")),
        );
        assert!(matches!(first, Ok(ActionOutcome::Saved(_))));
        assert!(second.is_err());

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].header, "First submit");
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_action_does_not_stay_pending() {
        let (orchestrator, _, _) = orchestrator(Arc::new(SpyBackend::new())).await;
        orchestrator.open_create().unwrap();
        orchestrator.ready(&[ActionKind::Create]).unwrap();
        {
            let _pending = PendingGuard::new(&orchestrator);
            assert_eq!(orchestrator.state(), ActionState::Pending);
        }
        assert!(matches!(orchestrator.state(), ActionState::Failure(_)));
        orchestrator.close().unwrap();
    }
}
