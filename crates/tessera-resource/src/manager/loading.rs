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

//! Preloading, driving loads to completion and reloading.

use super::{ManagerState, ResourceManager};
use crate::events::{ResourceEvent, ResourceEventInfo};
use crate::handle::ResourceHandle;
use crate::kind::ResourceKind;
use crate::loader::{LoadError, LoadRequest, ResourceLoadDesc, ResourceTypeLoader};
use crate::policy::UpdateContentScope;
use crate::resource::{Resource, ResourceFlags, ResourceState};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::Duration;
use tessera_core::{ResourceTypeId, Stopwatch};

/// Upper bound for one wait on a load running on another thread.
const LOAD_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Whether `current` satisfies a request to reach `target`.
fn reached(current: ResourceState, target: ResourceState) -> bool {
    let rank = |state: ResourceState| match state {
        ResourceState::Unloaded => 0,
        ResourceState::Loading => 1,
        ResourceState::Loaded | ResourceState::LoadedResourceMissing => 2,
    };
    current == ResourceState::LoadedResourceMissing || rank(current) >= rank(target)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "loader panicked".to_string()
    }
}

impl ResourceManager {
    /// Queues `handle` for background loading.
    pub fn preload_resource(&self, handle: &ResourceHandle) {
        if let Some(resource) = handle.resource_arc() {
            self.internal_preload(resource, false);
        }
    }

    pub(crate) fn internal_preload(&self, resource: &Arc<Resource>, urgent: bool) {
        let mut state = self.lock_state();
        self.preload_locked(&mut state, resource, urgent);
    }

    pub(crate) fn preload_locked(&self, state: &mut ManagerState, resource: &Arc<Resource>, urgent: bool) {
        if state.shutdown {
            return;
        }
        if resource.state() == ResourceState::Loaded && resource.quality_levels_loadable() == 0 {
            return;
        }
        if resource.state() == ResourceState::LoadedResourceMissing {
            return;
        }

        if resource.is_queued_for_loading() {
            // Still waiting: move it to the front. In flight: nothing to do.
            if urgent && state.queue.remove(resource) {
                state.queue.push(Arc::clone(resource), true, state.frame_time_ms);
            }
            return;
        }

        state.queue.push(Arc::clone(resource), urgent, state.frame_time_ms);
        self.wake_workers();
    }

    /// Loads `handle` on the calling thread unless it is already settled.
    pub fn force_load_resource_now(&self, handle: &ResourceHandle) {
        if let Some(resource) = handle.resource_arc() {
            self.ensure_loading_state(resource, ResourceState::Loaded);
        }
    }

    /// Blocks until `handle` is at least in `target` state, or missing.
    pub fn ensure_resource_loading_state(&self, handle: &ResourceHandle, target: ResourceState) {
        if let Some(resource) = handle.resource_arc() {
            self.ensure_loading_state(resource, target);
        }
    }

    /// The current loading state of `handle`, `None` for invalid handles.
    pub fn loading_state(&self, handle: &ResourceHandle) -> Option<ResourceState> {
        handle.state()
    }

    pub(crate) fn ensure_loading_state(&self, resource: &Arc<Resource>, target: ResourceState) {
        loop {
            if reached(resource.state(), target) {
                return;
            }

            let mut state = self.lock_state();
            if reached(resource.state(), target) {
                return;
            }

            if state.queue.remove(resource) {
                self.claim_locked(&mut state, resource);
                drop(state);
                self.run_load(resource);
                continue;
            }

            if !resource.is_queued_for_loading() {
                resource.add_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);
                self.claim_locked(&mut state, resource);
                drop(state);
                self.run_load(resource);
                continue;
            }

            // Another thread is loading it.
            let (state, _) = self
                .shared
                .state_changed
                .wait_timeout(state, LOAD_WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner);
            drop(state);
        }
    }

    /// Records that the calling thread now owns the load of `resource`.
    /// The resource must be flagged as queued and out of the queue.
    pub(crate) fn claim_locked(&self, state: &mut ManagerState, resource: &Arc<Resource>) {
        state.loads_in_flight += 1;
        if resource.state() == ResourceState::Unloaded {
            resource.set_state(ResourceState::Loading);
        }
    }

    /// Takes the front of the preload queue and claims it.
    pub(crate) fn claim_next_queued(&self) -> Option<Arc<Resource>> {
        let mut state = self.lock_state();
        let resource = state.queue.pop_front()?;
        self.claim_locked(&mut state, &resource);
        Some(resource)
    }

    /// Runs the load of a claimed resource with its loader.
    pub(crate) fn run_load(&self, resource: &Arc<Resource>) {
        let loader = {
            let state = self.lock_state();
            state.loader_for(resource, self.registry())
        };

        let outcome = match loader {
            Some(loader) => self.invoke_loader(resource, |request: &LoadRequest| loader.load(request)),
            None => Ok(Err(format!("no loader registered for type '{}'", resource.type_name()).into())),
        };

        self.finish_load(resource, outcome);
    }

    /// Calls `load` outside the manager lock, with the current thread marked
    /// as constructing a resource of `resource`'s type.
    ///
    /// A panic is caught and handed back so the claim can still be released.
    pub(crate) fn invoke_loader<F>(
        &self,
        resource: &Arc<Resource>,
        load: F,
    ) -> thread::Result<Result<ResourceLoadDesc, LoadError>>
    where
        F: FnOnce(&LoadRequest) -> Result<ResourceLoadDesc, LoadError>,
    {
        let _scope = UpdateContentScope::enter(resource.resource_type());
        let request = LoadRequest::new(Arc::clone(resource), self.clone());
        let stopwatch = Stopwatch::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| load(&request)));

        log::trace!(
            "Loading '{}' ({}) took {:.3} ms.",
            resource.id(),
            resource.type_name(),
            stopwatch.elapsed_secs_f64() * 1000.0
        );
        outcome
    }

    /// Completes a claimed load from the result of
    /// [`invoke_loader`](Self::invoke_loader).
    ///
    /// A panicking loader leaves the resource missing. In builds with debug
    /// assertions the panic is resumed once waiters have been released, so
    /// assertion failures inside loaders reach the caller.
    pub(crate) fn finish_load(
        &self,
        resource: &Arc<Resource>,
        outcome: thread::Result<Result<ResourceLoadDesc, LoadError>>,
    ) {
        match outcome {
            Ok(outcome) => self.complete_load(resource, outcome),
            Err(payload) => {
                self.complete_load(resource, Err(panic_message(payload.as_ref()).into()));
                if cfg!(debug_assertions) {
                    panic::resume_unwind(payload);
                }
            }
        }
    }

    /// Publishes the outcome of a claimed load and wakes every waiter.
    fn complete_load(&self, resource: &Arc<Resource>, outcome: Result<ResourceLoadDesc, LoadError>) {
        let mut state = self.lock_state();

        match outcome {
            Ok(desc) => {
                resource.apply_load(desc);
                log::debug!(
                    "Loaded '{}' ({}), {} quality level(s) left.",
                    resource.id(),
                    resource.type_name(),
                    resource.quality_levels_loadable()
                );
                self.publish(ResourceEvent::ContentLoaded(ResourceEventInfo::from(resource.as_ref())));
            }
            Err(err) if resource.state() == ResourceState::Loaded => {
                log::warn!(
                    "Failed to stream the next quality of '{}' ({}): {err}",
                    resource.id(),
                    resource.type_name()
                );
                resource.stop_streaming();
            }
            Err(err) => {
                log::warn!("Failed to load '{}' ({}): {err}", resource.id(), resource.type_name());
                resource.mark_missing();
                self.publish(ResourceEvent::Missing(ResourceEventInfo::from(resource.as_ref())));
            }
        }

        resource.remove_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);
        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
        drop(state);

        self.shared.state_changed.notify_all();
    }

    /// Loads up to `budget` queued resources on the calling thread.
    ///
    /// Returns the number of loads run. Managers without loader threads are
    /// driven this way from [`per_frame_update`](Self::per_frame_update).
    pub fn process_preload_queue(&self, budget: usize) -> usize {
        let mut processed = 0;
        while processed < budget {
            let Some(resource) = self.claim_next_queued() else {
                break;
            };
            self.run_load(&resource);
            processed += 1;
        }
        processed
    }

    /// Returns `true` while any resource waits in the preload queue or is
    /// being loaded.
    pub fn is_any_loading_in_progress(&self) -> bool {
        let state = self.lock_state();
        !state.queue.is_empty() || state.loads_in_flight > 0
    }

    /// Number of resources waiting in the preload queue.
    pub fn preload_queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    // --- Reloading ---

    /// Unloads `handle` so it gets loaded again on next use.
    ///
    /// Without `force`, only resources whose loader reports them outdated are
    /// reloaded. Recently acquired resources are queued again right away.
    /// Returns `true` if the content was unloaded.
    pub fn reload_resource(&self, handle: &ResourceHandle, force: bool) -> bool {
        let Some(resource) = handle.resource_arc() else {
            return false;
        };
        let mut state = self.lock_state();
        self.reload_locked(&mut state, resource, force)
    }

    pub(crate) fn reload_locked(&self, state: &mut ManagerState, resource: &Arc<Resource>, force: bool) -> bool {
        let flags = resource.flags();
        if !flags.contains(ResourceFlags::IS_RELOADABLE) && !flags.contains(ResourceFlags::HAS_CUSTOM_LOADER) {
            return false;
        }
        if flags.contains(ResourceFlags::PREVENT_FILE_RELOAD) && !force {
            return false;
        }

        let Some(loader) = state.loader_for(resource, self.registry()) else {
            return false;
        };

        if resource.state() == ResourceState::Unloaded {
            return false;
        }

        let mut still_queued = false;
        if resource.is_queued_for_loading() {
            if !state.queue.contains(resource) {
                log::debug!("'{}' is being loaded, skipping the reload.", resource.id());
                return false;
            }
            still_queued = true;
        }

        if !force && !loader.is_outdated(resource) {
            return false;
        }

        log::debug!("Reloading '{}' ({}).", resource.id(), resource.type_name());
        self.unload_resource_content(resource);

        let window_ms = u64::try_from(self.config().reload_recency_window().as_millis()).unwrap_or(u64::MAX);
        let recently_used = resource.last_acquired_ms() >= state.frame_time_ms.saturating_sub(window_ms);
        if recently_used && !still_queued {
            self.preload_locked(state, resource, false);
        }

        true
    }

    /// Publishes [`ResourceEvent::ContentUnloading`] and drops the content.
    pub(crate) fn unload_resource_content(&self, resource: &Arc<Resource>) {
        self.publish(ResourceEvent::ContentUnloading(ResourceEventInfo::from(resource.as_ref())));
        resource.unload_content();
    }

    /// Reloads every resource of type `T` or deriving from it.
    pub fn reload_resources_of_type<T: ResourceKind>(&self, force: bool) -> usize {
        self.reload_resources_of_type_id(T::resource_type(), force)
    }

    /// Typeless variant of [`reload_resources_of_type`](Self::reload_resources_of_type).
    pub fn reload_resources_of_type_id(&self, resource_type: ResourceTypeId, force: bool) -> usize {
        let mut state = self.lock_state();
        let resources: Vec<Arc<Resource>> = state
            .tables
            .iter()
            .filter(|(ty, _)| self.registry().is_derived_from(**ty, resource_type))
            .flat_map(|(_, table)| table.iter().cloned())
            .collect();

        resources
            .iter()
            .filter(|resource| self.reload_locked(&mut state, resource, force))
            .count()
    }

    /// Reloads every resource. Publishes
    /// [`ResourceEvent::ReloadAllResources`] when anything was reloaded.
    pub fn reload_all_resources(&self, force: bool) -> usize {
        let reloaded = {
            let mut state = self.lock_state();
            let resources: Vec<Arc<Resource>> = state.all_resources().cloned().collect();
            resources
                .iter()
                .filter(|resource| self.reload_locked(&mut state, resource, force))
                .count()
        };

        if reloaded > 0 {
            log::info!("Reloaded {reloaded} resource(s).");
            self.publish(ResourceEvent::ReloadAllResources);
        }
        reloaded
    }

    /// Lets the loader of every loaded resource restore content that was
    /// modified at runtime. See [`ResourceTypeLoader::reset`].
    ///
    /// Loaders run outside the manager lock. Returns the number of resources
    /// handed to a loader.
    pub fn reset_all_resources(&self) -> usize {
        let targets: Vec<(Arc<Resource>, Arc<dyn ResourceTypeLoader>)> = {
            let state = self.lock_state();
            state
                .all_resources()
                .filter(|resource| resource.state() == ResourceState::Loaded && resource.has_content())
                .filter_map(|resource| {
                    state
                        .loader_for(resource, self.registry())
                        .map(|loader| (Arc::clone(resource), loader))
                })
                .collect()
        };

        for (resource, loader) in &targets {
            let request = LoadRequest::new(Arc::clone(resource), self.clone());
            loader.reset(&request);
        }

        log::debug!("Reset {} resource(s).", targets.len());
        targets.len()
    }

    /// Replaces the content source of `handle` with `loader` and reloads it.
    ///
    /// File reloads are suppressed until [`restore_resource`](Self::restore_resource).
    pub fn update_resource_with_custom_loader(
        &self,
        handle: &ResourceHandle,
        loader: impl ResourceTypeLoader + 'static,
    ) -> bool {
        let Some(resource) = handle.resource_arc() else {
            return false;
        };

        let mut state = self.lock_state();
        resource.add_flags(ResourceFlags::HAS_CUSTOM_LOADER | ResourceFlags::PREVENT_FILE_RELOAD);
        state.custom_loaders.insert(
            (resource.resource_type(), resource.id_hash()),
            Arc::new(loader),
        );
        self.reload_locked(&mut state, resource, true)
    }

    /// Drops the custom loader of `handle` and reloads it from its type loader.
    pub fn restore_resource(&self, handle: &ResourceHandle) -> bool {
        let Some(resource) = handle.resource_arc() else {
            return false;
        };

        let mut state = self.lock_state();
        resource.remove_flags(ResourceFlags::PREVENT_FILE_RELOAD | ResourceFlags::HAS_CUSTOM_LOADER);
        let previous = state
            .custom_loaders
            .remove(&(resource.resource_type(), resource.id_hash()));
        let reloaded = self.reload_locked(&mut state, resource, true);
        drop(state);
        drop(previous);
        reloaded
    }
}
