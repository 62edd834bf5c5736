use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::config::GenerationTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

/// Open page views and the generation controlling each one.
///
/// Shared across generations: a new worker claims the same set of clients
/// its predecessor controlled.
#[derive(Default)]
pub struct Clients {
    next_id: AtomicU64,
    controllers: RwLock<BTreeMap<ClientId, Option<GenerationTag>>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// A freshly opened page starts uncontrolled until it is claimed or
    /// navigates under an active worker.
    pub async fn open(&self) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.controllers.write().await.insert(id, None);
        id
    }

    /// Open a page under an already-active generation.
    pub async fn open_controlled(&self, tag: &GenerationTag) -> ClientId {
        let id = self.open().await;
        self.controllers.write().await.insert(id, Some(tag.clone()));
        id
    }

    pub async fn close(&self, id: ClientId) -> bool {
        self.controllers.write().await.remove(&id).is_some()
    }

    /// Route every open client through `tag`. Returns how many switched.
    pub async fn claim(&self, tag: &GenerationTag) -> usize {
        let mut controllers = self.controllers.write().await;
        let mut switched = 0;
        for controller in controllers.values_mut() {
            if controller.as_ref() != Some(tag) {
                *controller = Some(tag.clone());
                switched += 1;
            }
        }
        switched
    }

    pub async fn controller(&self, id: ClientId) -> Option<GenerationTag> {
        self.controllers.read().await.get(&id).cloned().flatten()
    }

    pub async fn controlled_by(&self, tag: &GenerationTag) -> Vec<ClientId> {
        self.controllers
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.as_ref() == Some(tag))
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.controllers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
