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

//! Freeing unused resources, the per-frame update and shutdown.

use super::{ManagerState, ResourceManager};
use crate::events::{ResourceEvent, ResourceEventInfo};
use crate::resource::{Resource, ResourceFlags};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tessera_core::Stopwatch;

impl ResourceManager {
    /// Deletes `resource` from the manager. Fails for resources currently
    /// being loaded by some thread.
    fn deallocate_locked(&self, state: &mut ManagerState, resource: &Arc<Resource>) -> bool {
        if resource.is_queued_for_loading() {
            if !state.queue.remove(resource) {
                return false;
            }
            resource.remove_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);
        }

        if resource.has_content() {
            self.unload_resource_content(resource);
        }

        resource.set_loading_fallback(None);
        state
            .custom_loaders
            .remove(&(resource.resource_type(), resource.id_hash()));

        if let Some(table) = state.tables.get_mut(&resource.resource_type()) {
            table.remove(resource);
        }

        log::trace!("Deleted '{}' ({}).", resource.id(), resource.type_name());
        self.publish(ResourceEvent::Deleted(ResourceEventInfo::from(resource.as_ref())));
        true
    }

    /// Whether the per-frame sweep may free resources of `resource`'s type.
    fn incremental_unload_enabled(&self, state: &ManagerState, resource: &Resource) -> bool {
        self.registry()
            .ancestry(resource.resource_type())
            .into_iter()
            .all(|ty| state.policy(ty).map_or(true, |policy| policy.incremental_unload))
    }

    /// Frees every resource without handles, repeatedly, until a pass frees
    /// nothing. Freeing a resource may release the last handle to another one,
    /// typically its loading fallback.
    ///
    /// Returns the number of resources freed.
    pub fn free_all_unused_resources(&self) -> usize {
        let mut freed = 0;
        loop {
            let mut state = self.lock_state();
            let unused: Vec<Arc<Resource>> = state
                .all_resources()
                .filter(|resource| resource.ref_count() == 0)
                .cloned()
                .collect();

            let mut freed_this_pass = 0;
            for resource in &unused {
                if resource.ref_count() == 0 && self.deallocate_locked(&mut state, resource) {
                    freed_this_pass += 1;
                }
            }

            if freed_this_pass == 0 {
                if !unused.is_empty() {
                    log::debug!("{} unused resource(s) are still loading.", unused.len());
                }
                break;
            }
            freed += freed_this_pass;
        }

        if freed > 0 {
            log::debug!("Freed {freed} unused resource(s).");
        }
        freed
    }

    /// Frees unused resources not acquired for at least
    /// `last_acquire_threshold`, least recently acquired first, until
    /// `timeout` has elapsed.
    ///
    /// Types with incremental unloading disabled are skipped. Returns the
    /// number of resources freed.
    pub fn free_unused_resources(&self, timeout: Duration, last_acquire_threshold: Duration) -> usize {
        if timeout.is_zero() {
            return 0;
        }

        let stopwatch = Stopwatch::new();
        let threshold_ms = u64::try_from(last_acquire_threshold.as_millis()).unwrap_or(u64::MAX);

        let mut state = self.lock_state();
        let now_ms = state.frame_time_ms;

        let mut candidates: Vec<Arc<Resource>> = state
            .all_resources()
            .filter(|resource| {
                resource.ref_count() == 0
                    && now_ms.saturating_sub(resource.last_acquired_ms()) >= threshold_ms
                    && self.incremental_unload_enabled(&state, resource)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|resource| resource.last_acquired_ms());

        let mut freed = 0;
        for resource in &candidates {
            if stopwatch.has_elapsed(timeout) {
                break;
            }
            if resource.ref_count() == 0 && self.deallocate_locked(&mut state, resource) {
                freed += 1;
            }
        }
        freed
    }

    /// Advances the manager by one frame.
    ///
    /// Updates the frame clock and the fallback suppression counter, keeps the
    /// preload queue sorted and runs the unused-resource sweep when enabled.
    /// Managers without loader threads also process part of the queue here.
    pub fn per_frame_update(&self) {
        let (auto_free, shutdown, queued) = {
            let mut state = self.lock_state();
            state.frame_time_ms = self.now_ms();

            if state.force_no_fallback_frames > 0 && state.force_no_fallback_frames != u32::MAX {
                state.force_no_fallback_frames -= 1;
            }

            let now_ms = state.frame_time_ms;
            state
                .queue
                .update_priorities(now_ms, self.config().priority_updates_per_frame);

            (state.auto_free, state.shutdown, !state.queue.is_empty())
        };

        if !shutdown {
            if self.shared.worker_signals.is_none() {
                self.process_preload_queue(self.config().loads_per_frame);
            } else if queued {
                self.wake_workers();
            }
        }

        if let Some(auto_free) = auto_free {
            self.free_unused_resources(auto_free.timeout(), auto_free.last_acquire_threshold());
        }
    }

    /// Stops loading, releases every type configuration and frees all
    /// resources that are no longer referenced.
    ///
    /// Listeners of [`ResourceEvent::ManagerShuttingDown`] and cleanup
    /// callbacks run first, so they can release the handles they hold.
    ///
    /// Resources still referenced afterwards are reported as leaks. Calling
    /// this more than once has no further effect.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.queue.clear();
        }

        log::info!("ResourceManager shutting down.");
        self.publish(ResourceEvent::ManagerShuttingDown);
        self.execute_all_resource_cleanup_callbacks();

        let pool = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.shutdown();
        }

        let mut freed = self.free_all_unused_resources();

        let released = {
            let mut state = self.lock_state();
            state.custom_loaders.clear();
            state.default_loader = None;
            state.named_resources.clear();
            std::mem::take(&mut state.policies)
        };
        // Type fallbacks hold handles; drop them outside the lock.
        drop(released);

        freed += self.free_all_unused_resources();

        let state = self.lock_state();
        for resource in state.all_resources() {
            log::warn!(
                "Resource '{}' ({}) is still referenced by {} handle(s) at shutdown.",
                resource.id(),
                resource.type_name(),
                resource.ref_count()
            );
        }
        log::info!("ResourceManager shut down, {freed} resource(s) freed.");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shutdown
    }

    /// Publishes [`ResourceEvent::Exists`] for every resource.
    pub fn broadcast_exists_event(&self) {
        let state = self.lock_state();
        for resource in state.all_resources() {
            self.publish(ResourceEvent::Exists(ResourceEventInfo::from(resource.as_ref())));
        }
    }
}
