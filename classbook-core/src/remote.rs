use async_trait::async_trait;
use classbook_shared::ClassSummary;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// The marketplace backend as seen by this subsystem. Calls are best-effort:
/// local state moves on even when they fail.
#[async_trait]
pub trait ClassApiClient: Send + Sync {
    /// Tell the backend the provider cancelled the class
    async fn cancel_class_remote(&self, class_id: Uuid) -> CoreResult<()>;

    /// Remove the class listing from the backend
    async fn delete_class_remote(&self, class_id: Uuid) -> CoreResult<()>;

    async fn fetch_classes(&self) -> CoreResult<Vec<ClassSummary>>;
}

/// Class listings kept in process, for local runs and tests.
/// `set_offline(true)` makes every call fail as if the network were down.
pub struct InMemoryClassApi {
    classes: RwLock<HashMap<Uuid, ClassSummary>>,
    cancelled: RwLock<Vec<Uuid>>,
    offline: AtomicBool,
}

impl InMemoryClassApi {
    pub fn new(classes: Vec<ClassSummary>) -> Self {
        Self {
            classes: RwLock::new(classes.into_iter().map(|c| (c.id, c)).collect()),
            cancelled: RwLock::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Class ids the backend has been told about, in call order
    pub fn cancelled_classes(&self) -> Vec<Uuid> {
        self.cancelled.read().map(|c| c.clone()).unwrap_or_default()
    }

    fn ensure_online(&self) -> CoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CoreError::RemoteError("Class API unreachable".to_string()));
        }
        Ok(())
    }

    fn poisoned() -> CoreError {
        CoreError::RemoteError("Class catalog lock poisoned".to_string())
    }
}

impl Default for InMemoryClassApi {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ClassApiClient for InMemoryClassApi {
    async fn cancel_class_remote(&self, class_id: Uuid) -> CoreResult<()> {
        self.ensure_online()?;
        if !self.classes.read().map_err(|_| Self::poisoned())?.contains_key(&class_id) {
            return Err(CoreError::RemoteError(format!("Class {} not listed", class_id)));
        }
        self.cancelled.write().map_err(|_| Self::poisoned())?.push(class_id);
        tracing::debug!("Remote cancel acknowledged for class {}", class_id);
        Ok(())
    }

    async fn delete_class_remote(&self, class_id: Uuid) -> CoreResult<()> {
        self.ensure_online()?;
        let removed = self.classes.write().map_err(|_| Self::poisoned())?.remove(&class_id);
        match removed {
            Some(_) => Ok(()),
            None => Err(CoreError::RemoteError(format!("Class {} not listed", class_id))),
        }
    }

    async fn fetch_classes(&self) -> CoreResult<Vec<ClassSummary>> {
        self.ensure_online()?;
        let classes = self.classes.read().map_err(|_| Self::poisoned())?;
        let mut list: Vec<ClassSummary> = classes.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }
}
