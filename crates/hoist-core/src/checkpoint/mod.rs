//! Checkpoint document, slots and persistence.
//!
//! The checkpoint is the only source of truth for resuming a deployment.
//! Every mutation goes through [`Checkpoint`] and is flushed to disk before
//! the next step runs.

pub mod document;
pub mod slot;
pub mod store;

pub use document::{
    CHECKPOINT_VERSION, CheckpointDocument, FolderCheckpoint, RunStatus, ScopedRef,
    SubmoduleCheckpoint,
};
pub use slot::{ProjectField, ResourceSlots, Slot, SlotKey, SlotRef};
pub use store::CheckpointStore;

use chrono::Utc;

use crate::error::{DeployError, Result};

/// A checkpoint document bound to the store it is flushed to.
#[derive(Debug)]
pub struct Checkpoint {
    doc: CheckpointDocument,
    store: CheckpointStore,
}

impl Checkpoint {
    pub fn new(doc: CheckpointDocument, store: CheckpointStore) -> Self {
        Self { doc, store }
    }

    /// Load the stored document, or start an empty one.
    pub fn open(store: CheckpointStore) -> anyhow::Result<Self> {
        let doc = store.load()?.unwrap_or_default();
        Ok(Self { doc, store })
    }

    pub fn doc(&self) -> &CheckpointDocument {
        &self.doc
    }

    /// Mutable access; callers must `persist()` before the next step.
    pub fn doc_mut(&mut self) -> &mut CheckpointDocument {
        &mut self.doc
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn into_doc(self) -> CheckpointDocument {
        self.doc
    }

    /// Stamp and flush the document.
    pub fn persist(&mut self) -> Result<()> {
        self.doc.updated_at = Some(Utc::now());
        self.store.save(&self.doc).map_err(DeployError::Checkpoint)
    }

    /// Overwrite one slot and flush.
    pub fn set(&mut self, slot_ref: &SlotRef, slot: Slot) -> Result<()> {
        self.doc.set_slot(slot_ref, slot);
        self.persist()
    }

    pub fn slot(&self, slot_ref: &SlotRef) -> Slot {
        self.doc.slot(slot_ref)
    }
}
