//! Background completion polls for asynchronous creations.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::checkpoint::ProjectField;
use crate::collab::Authentication;
use crate::platform::{PlatformResult, ResourceFactory};

/// Resources whose creation returns a work request instead of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum BackgroundKind {
    ProjectLog,
    KnowledgeBase,
}

impl BackgroundKind {
    pub(super) fn field(self) -> ProjectField {
        match self {
            BackgroundKind::ProjectLog => ProjectField::ProjectLog,
            BackgroundKind::KnowledgeBase => ProjectField::KnowledgeBase,
        }
    }

    pub(super) fn label(self) -> &'static str {
        match self {
            BackgroundKind::ProjectLog => "project log",
            BackgroundKind::KnowledgeBase => "knowledge base",
        }
    }
}

pub(super) struct PendingTask {
    pub(super) handle: JoinHandle<PlatformResult<String>>,
    /// Display name the resource was requested with
    pub(super) display_name: String,
}

/// Polls spawned at issue time and awaited at their join points.
///
/// Dropping the set aborts whatever is still running; a later run
/// re-inspects the recorded work-request handle.
#[derive(Default)]
pub(super) struct BackgroundTasks {
    tasks: BTreeMap<BackgroundKind, PendingTask>,
}

impl BackgroundTasks {
    pub(super) fn spawn(
        &mut self,
        kind: BackgroundKind,
        factory: Arc<dyn ResourceFactory>,
        auth: Authentication,
        work_request: String,
        display_name: String,
    ) {
        let handle =
            tokio::spawn(async move { factory.wait_for_work_request(&auth, &work_request).await });
        if let Some(previous) = self.tasks.insert(
            kind,
            PendingTask {
                handle,
                display_name,
            },
        ) {
            previous.handle.abort();
        }
    }

    pub(super) fn take(&mut self, kind: BackgroundKind) -> Option<PendingTask> {
        self.tasks.remove(&kind)
    }

    pub(super) fn is_pending(&self, kind: BackgroundKind) -> bool {
        self.tasks.contains_key(&kind)
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.handle.abort();
        }
    }
}
