use crate::backend::{Backend, DocumentRecord};
use crate::document::{Document, Reviewer};
use crate::error::{DocboardError, Result};
use crate::session::SessionContext;
use crate::validation::{self, ValidationResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The record store accessor.
///
/// Owns the cached document and reviewer collections and hands out shared
/// snapshots. Every successful write drops the document cache once the write
/// has resolved, so the next read goes back to the backend.
pub struct RecordStore {
    backend: Arc<dyn Backend>,
    session: SessionContext,
    documents: Cached<Document>,
    reviewers: Cached<Reviewer>,
}

/// A cached collection plus an epoch bumped on every invalidation.
/// A fetch only populates the cache if no invalidation happened while it ran.
struct Cached<T> {
    slot: RwLock<Option<Arc<Vec<T>>>>,
    epoch: AtomicU64,
}

impl<T> Cached<T> {
    fn new() -> Self {
        Cached {
            slot: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    async fn get(&self) -> Option<Arc<Vec<T>>> {
        self.slot.read().await.clone()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store a fetched snapshot unless the cache was invalidated since `epoch`.
    async fn fill(&self, epoch: u64, value: Arc<Vec<T>>) -> bool {
        let mut slot = self.slot.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *slot = Some(value);
        true
    }

    async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }
}

impl RecordStore {
    pub fn new(backend: Arc<dyn Backend>, session: SessionContext) -> Self {
        RecordStore {
            backend,
            session,
            documents: Cached::new(),
            reviewers: Cached::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// All documents, newest first, with the reviewer join normalized.
    pub async fn list_documents(&self) -> Result<Arc<Vec<Document>>> {
        if let Some(cached) = self.documents.get().await {
            log::debug!("documents: cache hit ({} rows)", cached.len());
            return Ok(cached);
        }

        let epoch = self.documents.epoch();
        log::debug!("documents: cache miss, fetching");
        let rows = self
            .backend
            .select_documents()
            .await
            .map_err(DocboardError::into_query)?;
        let docs: Arc<Vec<Document>> = Arc::new(rows.into_iter().map(Document::from).collect());

        if !self.documents.fill(epoch, docs.clone()).await {
            log::debug!("documents: invalidated during fetch, result not cached");
        }
        Ok(docs)
    }

    pub async fn list_reviewers(&self) -> Result<Arc<Vec<Reviewer>>> {
        if let Some(cached) = self.reviewers.get().await {
            return Ok(cached);
        }

        let epoch = self.reviewers.epoch();
        let reviewers = Arc::new(
            self.backend
                .select_reviewers()
                .await
                .map_err(DocboardError::into_query)?,
        );
        self.reviewers.fill(epoch, reviewers.clone()).await;
        Ok(reviewers)
    }

    /// The cached documents without touching the backend.
    pub async fn cached_documents(&self) -> Option<Arc<Vec<Document>>> {
        self.documents.get().await
    }

    pub async fn invalidate_documents(&self) {
        log::debug!("documents: cache invalidated");
        self.documents.invalidate().await;
    }

    pub async fn invalidate_reviewers(&self) {
        self.reviewers.invalidate().await;
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Check field constraints locally. A set reviewer is checked against
    /// the reviewer collection, fetching it if it is not cached yet.
    pub async fn check_document(&self, doc: &Document) -> Result<ValidationResult> {
        let known = match doc.reviewer {
            Some(_) => Some(self.list_reviewers().await?),
            None => None,
        };
        Ok(validation::validate_document(
            doc,
            known.as_deref().map(Vec::as_slice),
        ))
    }

    /// Persist a new document owned by the signed-in user. The backend
    /// assigns the id; the returned document is the stored row.
    pub async fn create_document(&self, input: &Document) -> Result<Document> {
        self.check_document(input).await?.into_result()?;

        let user = self.session.current_user().ok_or_else(|| {
            log::warn!("Rejected document create: no signed-in user");
            DocboardError::Mutation("You must be signed in to create documents".into())
        })?;

        let record = DocumentRecord::from_document(input).with_user(user.id);
        let rows = self
            .backend
            .insert_document(&record)
            .await
            .map_err(DocboardError::into_mutation)?;
        let created = rows
            .into_iter()
            .next()
            .map(Document::from)
            .ok_or_else(|| DocboardError::Mutation("Insert returned no rows".into()))?;

        log::info!("Created document {}", created.id);
        self.invalidate_documents().await;
        Ok(created)
    }

    /// Replace every mutable field of the document with the same id.
    pub async fn update_document(&self, input: &Document) -> Result<Document> {
        if input.id.is_empty() {
            return Err(DocboardError::Validation("id: Document id is required".into()));
        }
        self.check_document(input).await?.into_result()?;

        let record = DocumentRecord::from_document(input);
        let rows = self
            .backend
            .update_document(&input.id, &record)
            .await
            .map_err(DocboardError::into_mutation)?;
        let updated = rows.into_iter().next().map(Document::from).ok_or_else(|| {
            DocboardError::Mutation(format!("No document matches id '{}'", input.id))
        })?;

        log::info!("Updated document {}", updated.id);
        self.invalidate_documents().await;
        Ok(updated)
    }

    /// Remove a document. Returns the id as confirmation.
    pub async fn delete_document(&self, id: &str) -> Result<String> {
        self.backend
            .delete_document(id)
            .await
            .map_err(DocboardError::into_mutation)?;

        log::info!("Deleted document {id}");
        self.invalidate_documents().await;
        Ok(id.to_string())
    }
}
