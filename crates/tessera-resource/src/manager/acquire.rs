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

//! The acquisition state machine.

use super::ResourceManager;
use crate::acquire::{AcquireMode, AcquireResult, AcquiredResource, ResourceLock};
use crate::config::FailurePolicy;
use crate::handle::{ResourceHandle, TypedResourceHandle};
use crate::kind::ResourceKind;
use crate::policy::{type_being_updated, TypeLoadingPolicy};
use crate::resource::{Resource, ResourceState};
use std::sync::Arc;

/// Steps of the loading-fallback search, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackStep {
    Requested,
    TryResourceFallback,
    TryCallerFallback,
    TryTypeFallback,
    Blocking,
}

/// Reports a broken fallback configuration.
fn fallback_configuration_error(message: String) {
    debug_assert!(false, "{message}");
    log::error!("{message}");
}

impl ResourceManager {
    /// Acquires the resource behind `handle`.
    ///
    /// Depending on `mode`, this may queue the resource, block until it is
    /// loaded, or return a loading or missing fallback instead.
    pub fn acquire<T: ResourceKind>(&self, handle: &TypedResourceHandle<T>, mode: AcquireMode) -> ResourceLock<T> {
        ResourceLock::new(self.acquire_typeless(handle.as_typeless(), mode, None))
    }

    /// Same as [`acquire`](Self::acquire), with a caller-supplied loading
    /// fallback that ranks between the resource's own fallback and the
    /// type-wide one.
    pub fn acquire_with_fallback<T: ResourceKind>(
        &self,
        handle: &TypedResourceHandle<T>,
        mode: AcquireMode,
        fallback: &TypedResourceHandle<T>,
    ) -> ResourceLock<T> {
        ResourceLock::new(self.acquire_typeless(handle.as_typeless(), mode, Some(fallback.as_typeless())))
    }

    /// Typeless acquisition.
    pub fn acquire_typeless(
        &self,
        handle: &ResourceHandle,
        mode: AcquireMode,
        fallback: Option<&ResourceHandle>,
    ) -> AcquiredResource {
        let Some(resource) = handle.resource_arc() else {
            debug_assert!(false, "Cannot acquire a resource through an invalid handle");
            log::error!("Cannot acquire a resource through an invalid handle.");
            return AcquiredResource::none();
        };

        let (returned, result) = self.acquire_resource(handle, resource, mode, fallback);
        if result == AcquireResult::None {
            return AcquiredResource::none();
        }
        AcquiredResource::new(returned, result)
    }

    fn acquire_resource(
        &self,
        handle: &ResourceHandle,
        resource: &Arc<Resource>,
        mode: AcquireMode,
        caller_fallback: Option<&ResourceHandle>,
    ) -> (ResourceHandle, AcquireResult) {
        if mode != AcquireMode::PointerOnly {
            self.check_acquire_during_update(resource);
        }

        let (mode, frame_time_ms) = {
            let state = self.lock_state();
            let mode = if state.force_no_fallback_frames > 0 {
                mode.blocking()
            } else {
                mode
            };
            (mode, state.frame_time_ms)
        };

        if mode == AcquireMode::PointerOnly {
            return (handle.clone(), AcquireResult::Final);
        }

        resource.touch(frame_time_ms);

        if resource.state() != ResourceState::LoadedResourceMissing {
            if resource.state() != ResourceState::Loaded {
                let mut step = FallbackStep::Requested;
                loop {
                    step = match step {
                        FallbackStep::Requested => {
                            self.internal_preload(resource, !mode.allows_loading_fallback());
                            if mode.allows_loading_fallback() {
                                FallbackStep::TryResourceFallback
                            } else {
                                FallbackStep::Blocking
                            }
                        }
                        FallbackStep::TryResourceFallback => match resource.loading_fallback().filter(|fb| fb != handle) {
                            Some(fallback) => return self.use_loading_fallback(fallback),
                            None => FallbackStep::TryCallerFallback,
                        },
                        FallbackStep::TryCallerFallback => match caller_fallback.filter(|fb| fb.is_valid() && *fb != handle) {
                            Some(fallback) => return self.use_loading_fallback(fallback.clone()),
                            None => FallbackStep::TryTypeFallback,
                        },
                        FallbackStep::TryTypeFallback => {
                            let fallback = self
                                .type_fallback(resource, |policy| policy.loading_fallback.as_ref())
                                .filter(|fb| fb != handle);
                            match fallback {
                                Some(fallback) => return self.use_loading_fallback(fallback),
                                None => FallbackStep::Blocking,
                            }
                        }
                        FallbackStep::Blocking => {
                            self.ensure_loading_state(resource, ResourceState::Loaded);
                            break;
                        }
                    };
                }
            } else if resource.quality_levels_loadable() > 0 && !resource.is_queued_for_loading() {
                self.internal_preload(resource, false);
            }
        }

        if resource.state() == ResourceState::LoadedResourceMissing {
            if let Some(fallback) = self.type_fallback(resource, |policy| policy.missing_fallback.as_ref()) {
                return match self.use_missing_fallback(fallback) {
                    Some(fallback) => (fallback, AcquireResult::MissingFallback),
                    None => (ResourceHandle::invalid(), AcquireResult::None),
                };
            }
            if !mode.never_fails() {
                self.report_missing(resource);
            }
            return (ResourceHandle::invalid(), AcquireResult::None);
        }

        (handle.clone(), AcquireResult::Final)
    }

    /// The closest type-wide fallback along the ancestry of `resource`'s type.
    fn type_fallback<F>(&self, resource: &Resource, select: F) -> Option<ResourceHandle>
    where
        F: Fn(&TypeLoadingPolicy) -> Option<&ResourceHandle>,
    {
        let ancestry = self.registry().ancestry(resource.resource_type());
        let state = self.lock_state();
        ancestry
            .into_iter()
            .find_map(|ty| state.policy(ty).and_then(&select).cloned())
    }

    /// Loads a loading fallback to completion. A missing loading fallback is
    /// itself replaced by its type's missing-fallback.
    fn use_loading_fallback(&self, fallback: ResourceHandle) -> (ResourceHandle, AcquireResult) {
        let Some(resource) = fallback.resource_arc() else {
            return (fallback, AcquireResult::LoadingFallback);
        };

        resource.touch(self.lock_state().frame_time_ms);
        self.ensure_loading_state(resource, ResourceState::Loaded);

        if resource.state() == ResourceState::LoadedResourceMissing {
            match self
                .type_fallback(resource, |policy| policy.missing_fallback.as_ref())
                .and_then(|missing| self.use_missing_fallback(missing))
            {
                Some(missing) => return (missing, AcquireResult::LoadingFallback),
                None => log::error!(
                    "Loading fallback '{}' ({}) is missing.",
                    resource.id(),
                    resource.type_name()
                ),
            }
        }

        (fallback, AcquireResult::LoadingFallback)
    }

    /// Loads a missing-fallback to completion. It must not be missing itself;
    /// if it is, `None` is returned in release builds.
    fn use_missing_fallback(&self, fallback: ResourceHandle) -> Option<ResourceHandle> {
        if let Some(resource) = fallback.resource_arc() {
            resource.touch(self.lock_state().frame_time_ms);
            self.ensure_loading_state(resource, ResourceState::Loaded);

            if resource.state() == ResourceState::LoadedResourceMissing {
                fallback_configuration_error(format!(
                    "Missing-fallback '{}' of type '{}' is itself missing.",
                    resource.id(),
                    resource.type_name()
                ));
                return None;
            }
        }
        Some(fallback)
    }

    fn report_missing(&self, resource: &Resource) {
        let message = format!(
            "Resource '{}' of type '{}' is missing and has no missing-fallback.",
            resource.id(),
            resource.type_name()
        );
        match self.config().failure_policy {
            FailurePolicy::Panic => panic!("{message}"),
            FailurePolicy::Log => log::error!("{message}"),
        }
    }

    /// Enforces the construction allow-list for the calling thread.
    fn check_acquire_during_update(&self, resource: &Resource) {
        let Some(being_updated) = type_being_updated() else {
            return;
        };

        let allowed = {
            let state = self.lock_state();
            self.acquire_allowed_locked(&state, being_updated, resource.resource_type())
        };

        if !allowed {
            let message = format!(
                "Acquiring '{}' ({}) while constructing a '{}' resource is not allowed.",
                resource.id(),
                resource.type_name(),
                self.registry().type_name(being_updated).unwrap_or_default()
            );
            debug_assert!(false, "{message}");
            log::error!("{message}");
        }
    }
}
