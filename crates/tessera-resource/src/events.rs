// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Notifications broadcast by the [`ResourceManager`](crate::ResourceManager).
//!
//! Events carry the identity of a resource, never a handle, so listening to
//! them cannot keep a resource alive.
//!
//! Two delivery paths exist. The event bus queues a copy for every subscriber
//! and is meant for observers that poll. Listeners run synchronously on the
//! thread that raised the event, before the manager acts on it: a
//! [`ResourceEvent::ContentUnloading`] listener still sees the content.

use crate::resource::{Resource, ResourceState};
use crate::table::hash_resource_id;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tessera_core::ResourceTypeId;

/// Identity and state of the resource an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEventInfo {
    /// Dynamic type of the resource.
    pub resource_type: ResourceTypeId,
    /// Id of the resource.
    pub resource_id: String,
    /// Loading state at the time of the event.
    pub state: ResourceState,
    /// Live handles at the time of the event.
    pub ref_count: u32,
}

impl From<&Resource> for ResourceEventInfo {
    fn from(resource: &Resource) -> Self {
        Self {
            resource_type: resource.resource_type(),
            resource_id: resource.id().to_string(),
            state: resource.state(),
            ref_count: resource.ref_count(),
        }
    }
}

/// An event published on the manager's event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A resource record was inserted into its table.
    Created(ResourceEventInfo),
    /// Answer to `broadcast_exists_event`, once per existing resource.
    Exists(ResourceEventInfo),
    /// New content (or a new quality level) was published.
    ContentLoaded(ResourceEventInfo),
    /// The resource is about to release its content. Holders of handles may
    /// still reference it afterwards; only the content goes away.
    ContentUnloading(ResourceEventInfo),
    /// The loader failed and the resource is now missing.
    Missing(ResourceEventInfo),
    /// The resource record was removed from its table.
    Deleted(ResourceEventInfo),
    /// `reload_all_resources` reloaded at least one resource.
    ReloadAllResources,
    /// The manager is shutting down; no further loads will run.
    ManagerShuttingDown,
}

impl ResourceEvent {
    /// The resource the event is about, if it is a per-resource event.
    pub fn info(&self) -> Option<&ResourceEventInfo> {
        match self {
            ResourceEvent::Created(info)
            | ResourceEvent::Exists(info)
            | ResourceEvent::ContentLoaded(info)
            | ResourceEvent::ContentUnloading(info)
            | ResourceEvent::Missing(info)
            | ResourceEvent::Deleted(info) => Some(info),
            ResourceEvent::ReloadAllResources | ResourceEvent::ManagerShuttingDown => None,
        }
    }

    /// Shorthand for the id of [`info`](Self::info).
    pub fn resource_id(&self) -> Option<&str> {
        self.info().map(|info| info.resource_id.as_str())
    }
}

/// A callback run synchronously for every event it is registered for.
///
/// Listeners may run while the manager lock is held. They must not call back
/// into the [`ResourceManager`](crate::ResourceManager) that raised the event.
pub type ResourceEventListener = Arc<dyn Fn(&ResourceEvent) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerList = Vec<(ListenerId, ResourceEventListener)>;

/// Synchronous listeners, both manager-wide and bound to one resource.
#[derive(Default)]
pub(crate) struct EventListeners {
    next_id: AtomicU64,
    global: RwLock<ListenerList>,
    per_resource: RwLock<HashMap<(ResourceTypeId, u64), ListenerList>>,
}

impl EventListeners {
    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add(&self, listener: ResourceEventListener) -> ListenerId {
        let id = self.next_id();
        self.global
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub(crate) fn add_for(&self, key: (ResourceTypeId, u64), listener: ResourceEventListener) -> ListenerId {
        let id = self.next_id();
        self.per_resource
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
        let before = global.len();
        global.retain(|(entry, _)| *entry != id);
        if global.len() != before {
            return true;
        }
        drop(global);

        let mut per_resource = self.per_resource.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        per_resource.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|(entry, _)| *entry != id);
            removed |= listeners.len() != before;
            !listeners.is_empty()
        });
        removed
    }

    /// Runs the listeners of the event's resource, then the manager-wide ones.
    ///
    /// Listeners of a deleted resource are dropped after they ran.
    pub(crate) fn dispatch(&self, event: &ResourceEvent) {
        let key = event
            .info()
            .map(|info| (info.resource_type, hash_resource_id(&info.resource_id)));

        if let Some(key) = key {
            let bound: ListenerList = if matches!(event, ResourceEvent::Deleted(_)) {
                self.per_resource
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key)
                    .unwrap_or_default()
            } else {
                self.per_resource
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&key)
                    .cloned()
                    .unwrap_or_default()
            };
            for (_, listener) in &bound {
                listener(event);
            }
        }

        let global: ListenerList = self
            .global
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (_, listener) in &global {
            listener(event);
        }
    }
}
