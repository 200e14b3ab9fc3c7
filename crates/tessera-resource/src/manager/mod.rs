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

//! The [`ResourceManager`] service.
//!
//! All tables, the preload queue and every state transition are guarded by one
//! manager lock. The lock is never held while a loader runs; waiting threads
//! park on a condition variable that is notified whenever a load completes.
//!
//! The implementation is split by concern:
//! - `lookup`: id resolution, creation, named resources and type overrides.
//! - `acquire`: the acquisition state machine and fallback resolution.
//! - `loading`: preloading, driving loads to completion and reloading.
//! - `unload`: freeing unused resources, the per-frame update and shutdown.

mod acquire;
mod loading;
mod lookup;
mod unload;

use crate::config::{AutoFreeConfig, ResourceManagerConfig};
use crate::events::{EventListeners, ListenerId, ResourceEvent, ResourceEventListener};
use crate::handle::ResourceHandle;
use crate::kind::ResourceKind;
use crate::loader::ResourceTypeLoader;
use crate::policy::{TypeLoadingPolicy, TypeOverrides};
use crate::preload::PreloadQueue;
use crate::resource::{Resource, ResourcePriority};
use crate::table::LoadedResourceTable;
use crate::worker::{LoaderPool, WorkerSignal};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tessera_core::event::EventBus;
use tessera_core::{ResourceTypeId, Stopwatch, TypeRegistry};

/// Key of a resource across all tables.
pub(crate) type ResourceKey = (ResourceTypeId, u64);

/// A callback run once when the manager shuts down, before unused resources
/// are freed. Used to release handles held outside the manager.
pub type CleanupCallback = Box<dyn FnOnce() + Send>;

/// Identifies a registered [`CleanupCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupCallbackId(u64);

/// Everything guarded by the manager lock.
#[derive(Default)]
pub(crate) struct ManagerState {
    pub(crate) tables: HashMap<ResourceTypeId, LoadedResourceTable>,
    pub(crate) policies: HashMap<ResourceTypeId, TypeLoadingPolicy>,
    pub(crate) overrides: TypeOverrides,
    pub(crate) named_resources: HashMap<String, String>,
    pub(crate) custom_loaders: HashMap<ResourceKey, Arc<dyn ResourceTypeLoader>>,
    pub(crate) default_loader: Option<Arc<dyn ResourceTypeLoader>>,
    pub(crate) queue: PreloadQueue,
    pub(crate) loads_in_flight: usize,
    pub(crate) frame_time_ms: u64,
    pub(crate) force_no_fallback_frames: u32,
    pub(crate) auto_free: Option<AutoFreeConfig>,
    pub(crate) next_unique_id: u64,
    pub(crate) cleanup_callbacks: Vec<(CleanupCallbackId, CleanupCallback)>,
    pub(crate) next_cleanup_id: u64,
    pub(crate) shutdown: bool,
}

impl ManagerState {
    pub(crate) fn policy(&self, resource_type: ResourceTypeId) -> Option<&TypeLoadingPolicy> {
        self.policies.get(&resource_type)
    }

    pub(crate) fn policy_mut(&mut self, resource_type: ResourceTypeId) -> &mut TypeLoadingPolicy {
        self.policies.entry(resource_type).or_default()
    }

    /// The loader for `resource`: its custom loader, else the closest type
    /// loader along its ancestry, else the default loader.
    pub(crate) fn loader_for(
        &self,
        resource: &Resource,
        registry: &dyn TypeRegistry,
    ) -> Option<Arc<dyn ResourceTypeLoader>> {
        if let Some(custom) = self
            .custom_loaders
            .get(&(resource.resource_type(), resource.id_hash()))
        {
            return Some(Arc::clone(custom));
        }

        registry
            .ancestry(resource.resource_type())
            .into_iter()
            .find_map(|ty| self.policy(ty).and_then(|policy| policy.loader.clone()))
            .or_else(|| self.default_loader.clone())
    }

    pub(crate) fn all_resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.tables.values().flat_map(LoadedResourceTable::iter)
    }
}

pub(crate) struct ManagerShared {
    pub(crate) state: Mutex<ManagerState>,
    pub(crate) state_changed: Condvar,
    pub(crate) registry: Arc<dyn TypeRegistry>,
    pub(crate) events: EventBus<ResourceEvent>,
    pub(crate) listeners: EventListeners,
    pub(crate) config: ResourceManagerConfig,
    pub(crate) clock: Stopwatch,
    pub(crate) worker_signals: Option<crossbeam_channel::Sender<WorkerSignal>>,
    pub(crate) workers: Mutex<Option<LoaderPool>>,
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        let pool = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.shutdown();
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.queue.clear();
        for resource in state.tables.values().flat_map(LoadedResourceTable::iter) {
            if resource.ref_count() > 0 {
                log::warn!(
                    "Resource '{}' ({}) outlives its manager with {} handle(s).",
                    resource.id(),
                    resource.type_name(),
                    resource.ref_count()
                );
            }
        }
    }
}

/// The central service managing every resource.
///
/// `ResourceManager` is a cheap handle to shared state: clone it to hand the
/// capability to another subsystem or thread. Call
/// [`shutdown`](ResourceManager::shutdown) before tearing the engine down;
/// dropping the last clone performs a reduced shutdown on its own.
#[derive(Clone)]
pub struct ResourceManager {
    shared: Arc<ManagerShared>,
}

impl ResourceManager {
    /// Creates a manager and starts its background loader threads.
    ///
    /// ## Arguments
    /// * `registry` - The type identity and derivation oracle.
    /// * `config` - Runtime configuration.
    pub fn new(registry: Arc<dyn TypeRegistry>, config: ResourceManagerConfig) -> Self {
        let (signals, receiver) = if config.worker_threads > 0 {
            let (sender, receiver) = crossbeam_channel::unbounded();
            (Some(sender), Some(receiver))
        } else {
            (None, None)
        };

        let state = ManagerState {
            auto_free: config.auto_free_unused,
            ..ManagerState::default()
        };

        let shared = Arc::new(ManagerShared {
            state: Mutex::new(state),
            state_changed: Condvar::new(),
            registry,
            events: EventBus::new(),
            listeners: EventListeners::default(),
            config,
            clock: Stopwatch::new(),
            worker_signals: signals.clone(),
            workers: Mutex::new(None),
        });

        if let (Some(signals), Some(receiver)) = (signals, receiver) {
            let pool = LoaderPool::spawn(
                shared.config.worker_threads,
                Arc::downgrade(&shared),
                signals,
                receiver,
            );
            *shared.workers.lock().unwrap_or_else(PoisonError::into_inner) = Some(pool);
        }

        log::info!(
            "ResourceManager initialized with {} loader thread(s).",
            shared.config.worker_threads
        );

        Self { shared }
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the synchronous listeners, then queues `event` on the bus.
    pub(crate) fn publish(&self, event: ResourceEvent) {
        self.shared.listeners.dispatch(&event);
        self.shared.events.publish(event);
    }

    /// Milliseconds on the manager clock.
    pub(crate) fn now_ms(&self) -> u64 {
        self.shared.clock.elapsed_ms()
    }

    pub(crate) fn wake_workers(&self) {
        if let Some(signals) = &self.shared.worker_signals {
            let _ = signals.send(WorkerSignal::Wake);
        }
    }

    /// The configuration the manager was created with.
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.shared.config
    }

    /// The type identity and derivation oracle.
    pub fn registry(&self) -> &dyn TypeRegistry {
        self.shared.registry.as_ref()
    }

    /// Subscribes to resource and manager events.
    pub fn subscribe(&self) -> flume::Receiver<ResourceEvent> {
        self.shared.events.subscribe()
    }

    /// Registers a listener run synchronously for every event.
    pub fn add_event_listener(&self, listener: ResourceEventListener) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    /// Registers a listener run synchronously for the events of the resource
    /// behind `handle` only. It is dropped once the resource is deallocated.
    ///
    /// Returns `None` for an invalid handle.
    pub fn add_resource_event_listener(
        &self,
        handle: &ResourceHandle,
        listener: ResourceEventListener,
    ) -> Option<ListenerId> {
        let resource = handle.resource()?;
        Some(
            self.shared
                .listeners
                .add_for((resource.resource_type(), resource.id_hash()), listener),
        )
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Registers a callback run once during [`shutdown`](Self::shutdown),
    /// before unused resources are freed.
    pub fn add_resource_cleanup_callback(&self, callback: impl FnOnce() + Send + 'static) -> CleanupCallbackId {
        let mut state = self.lock_state();
        let id = CleanupCallbackId(state.next_cleanup_id);
        state.next_cleanup_id += 1;
        state.cleanup_callbacks.push((id, Box::new(callback)));
        id
    }

    /// Unregisters a cleanup callback without running it.
    pub fn clear_resource_cleanup_callback(&self, id: CleanupCallbackId) -> bool {
        let removed = {
            let mut state = self.lock_state();
            state
                .cleanup_callbacks
                .iter()
                .position(|(entry, _)| *entry == id)
                .map(|index| state.cleanup_callbacks.swap_remove(index))
        };
        removed.is_some()
    }

    /// Runs and unregisters every cleanup callback, outside the manager lock.
    pub fn execute_all_resource_cleanup_callbacks(&self) {
        let callbacks = std::mem::take(&mut self.lock_state().cleanup_callbacks);
        for (_, callback) in callbacks {
            callback();
        }

        let registered = self.lock_state().cleanup_callbacks.len();
        if registered > 0 {
            log::warn!("{registered} resource cleanup callback(s) were registered during resource cleanup.");
        }
    }

    /// Returns `true` if both values refer to the same manager.
    pub fn ptr_eq(&self, other: &ResourceManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // --- Type configuration ---

    /// Registers the loader for resources of `resource_type` and of every type
    /// deriving from it that has no loader of its own.
    pub fn set_resource_type_loader(
        &self,
        resource_type: ResourceTypeId,
        loader: impl ResourceTypeLoader + 'static,
    ) {
        self.lock_state().policy_mut(resource_type).loader = Some(Arc::new(loader));
    }

    /// Typed shorthand for [`set_resource_type_loader`](Self::set_resource_type_loader).
    pub fn set_loader_for<T: ResourceKind>(&self, loader: impl ResourceTypeLoader + 'static) {
        self.set_resource_type_loader(T::resource_type(), loader);
    }

    /// Registers the loader used when a type has no loader at all.
    pub fn set_default_resource_loader(&self, loader: impl ResourceTypeLoader + 'static) {
        self.lock_state().default_loader = Some(Arc::new(loader));
    }

    /// Sets the type-wide fallback returned while resources of `resource_type`
    /// are loading. An invalid handle clears it.
    pub fn set_type_loading_fallback(&self, resource_type: ResourceTypeId, fallback: ResourceHandle) {
        let fallback = fallback.is_valid().then_some(fallback);
        let previous = std::mem::replace(
            &mut self.lock_state().policy_mut(resource_type).loading_fallback,
            fallback,
        );
        drop(previous);
    }

    /// Sets the type-wide fallback returned instead of missing resources of
    /// `resource_type`. An invalid handle clears it.
    pub fn set_type_missing_fallback(&self, resource_type: ResourceTypeId, fallback: ResourceHandle) {
        let fallback = fallback.is_valid().then_some(fallback);
        let previous = std::mem::replace(
            &mut self.lock_state().policy_mut(resource_type).missing_fallback,
            fallback,
        );
        drop(previous);
    }

    /// Enables or disables the per-frame freeing of unused resources of a type.
    pub fn set_incremental_unload_for_resource_type(&self, resource_type: ResourceTypeId, active: bool) {
        self.lock_state().policy_mut(resource_type).incremental_unload = active;
    }

    /// Sets the priority newly created resources of a type start with.
    pub fn set_default_priority(&self, resource_type: ResourceTypeId, priority: ResourcePriority) {
        self.lock_state().policy_mut(resource_type).default_priority = priority;
    }

    /// Allows resources of `wanted` (or deriving from it) to be acquired while
    /// a resource of `being_updated` is being loaded or created.
    pub fn allow_resource_type_acquire_during_update_content(
        &self,
        being_updated: ResourceTypeId,
        wanted: ResourceTypeId,
    ) {
        self.lock_state()
            .policy_mut(being_updated)
            .acquire_during_update
            .insert(wanted);
    }

    /// Checks the construction allow-list.
    pub fn is_resource_type_acquire_during_update_content_allowed(
        &self,
        being_updated: ResourceTypeId,
        wanted: ResourceTypeId,
    ) -> bool {
        let state = self.lock_state();
        self.acquire_allowed_locked(&state, being_updated, wanted)
    }

    pub(crate) fn acquire_allowed_locked(
        &self,
        state: &ManagerState,
        being_updated: ResourceTypeId,
        wanted: ResourceTypeId,
    ) -> bool {
        state.policy(being_updated).is_some_and(|policy| {
            policy
                .acquire_during_update
                .iter()
                .any(|allowed| self.registry().is_derived_from(wanted, *allowed))
        })
    }

    /// Creates resources of `derived` instead of one of its base types
    /// whenever `decider` accepts the requested id.
    pub fn register_resource_override_type(
        &self,
        derived: ResourceTypeId,
        decider: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) {
        let registry = Arc::clone(&self.shared.registry);
        self.lock_state()
            .overrides
            .register(registry.as_ref(), derived, Arc::new(decider));
    }

    /// Removes the overrides registered for `derived`.
    pub fn unregister_resource_override_type(&self, derived: ResourceTypeId) {
        self.lock_state().overrides.unregister(derived);
    }

    /// Treats `AllowLoadingFallback` acquisitions as blocking for the next
    /// `frames` calls to [`per_frame_update`](Self::per_frame_update).
    pub fn force_no_fallback_acquisition(&self, frames: u32) {
        self.lock_state().force_no_fallback_frames = frames;
    }

    /// Remaining frames of [`force_no_fallback_acquisition`](Self::force_no_fallback_acquisition).
    pub fn force_no_fallback_frames(&self) -> u32 {
        self.lock_state().force_no_fallback_frames
    }

    /// Enables, changes or disables the per-frame unused-resource sweep.
    pub fn set_auto_free_unused(&self, auto_free: Option<AutoFreeConfig>) {
        self.lock_state().auto_free = auto_free;
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ResourceManager")
            .field("types", &state.tables.len())
            .field("resources", &state.all_resources().count())
            .field("queued", &state.queue.len())
            .field("in_flight", &state.loads_in_flight)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}
