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

//! Per-type loading policy, type overrides and the construction allow-list.

use crate::handle::ResourceHandle;
use crate::loader::ResourceTypeLoader;
use crate::resource::ResourcePriority;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_core::{ResourceTypeId, TypeRegistry};

/// Bound on override redirections for a single lookup.
const MAX_OVERRIDE_HOPS: usize = 64;

/// Decides whether a resource id should be created with an overriding type.
pub type OverrideDecider = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// How resources of one type are loaded, substituted and unloaded.
pub(crate) struct TypeLoadingPolicy {
    /// Loader used for every resource of the type without a custom loader.
    pub(crate) loader: Option<Arc<dyn ResourceTypeLoader>>,
    /// Returned while a resource of the type is still loading.
    pub(crate) loading_fallback: Option<ResourceHandle>,
    /// Returned instead of a resource of the type that failed to load.
    pub(crate) missing_fallback: Option<ResourceHandle>,
    /// Whether the per-frame sweep may free unused resources of the type.
    pub(crate) incremental_unload: bool,
    /// Types that may be acquired while a resource of this type is constructed.
    pub(crate) acquire_during_update: HashSet<ResourceTypeId>,
    /// Priority given to newly created resources of the type.
    pub(crate) default_priority: ResourcePriority,
}

impl Default for TypeLoadingPolicy {
    fn default() -> Self {
        Self {
            loader: None,
            loading_fallback: None,
            missing_fallback: None,
            incremental_unload: true,
            acquire_during_update: HashSet::new(),
            default_priority: ResourcePriority::Medium,
        }
    }
}

struct TypeOverride {
    derived: ResourceTypeId,
    decider: OverrideDecider,
}

/// Registered type overrides, indexed by every base type of the overriding type.
#[derive(Default)]
pub(crate) struct TypeOverrides {
    by_base: HashMap<ResourceTypeId, Vec<TypeOverride>>,
}

impl TypeOverrides {
    /// Registers `derived` as an override for all of its base types.
    pub(crate) fn register(&mut self, registry: &dyn TypeRegistry, derived: ResourceTypeId, decider: OverrideDecider) {
        self.unregister(derived);

        for base in registry.ancestry(derived).into_iter().skip(1) {
            self.by_base.entry(base).or_default().push(TypeOverride {
                derived,
                decider: Arc::clone(&decider),
            });
        }
    }

    /// Removes every override that redirects to `derived`.
    pub(crate) fn unregister(&mut self, derived: ResourceTypeId) {
        for overrides in self.by_base.values_mut() {
            overrides.retain(|entry| entry.derived != derived);
        }
        self.by_base.retain(|_, overrides| !overrides.is_empty());
    }

    /// Returns the most specific type that `id` should be created as.
    pub(crate) fn resolve(&self, requested: ResourceTypeId, id: &str) -> ResourceTypeId {
        let mut current = requested;

        for _ in 0..MAX_OVERRIDE_HOPS {
            let next = self
                .by_base
                .get(&current)
                .and_then(|overrides| overrides.iter().find(|entry| (entry.decider)(id)))
                .map(|entry| entry.derived);

            match next {
                Some(derived) if derived != current => current = derived,
                _ => return current,
            }
        }

        log::error!("Type overrides for resource '{id}' do not converge.");
        current
    }
}

thread_local! {
    static TYPES_BEING_UPDATED: RefCell<Vec<ResourceTypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as constructing a resource of a given type.
pub(crate) struct UpdateContentScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl UpdateContentScope {
    pub(crate) fn enter(resource_type: ResourceTypeId) -> Self {
        TYPES_BEING_UPDATED.with(|stack| stack.borrow_mut().push(resource_type));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for UpdateContentScope {
    fn drop(&mut self) {
        TYPES_BEING_UPDATED.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The type whose content the current thread is constructing, if any.
pub(crate) fn type_being_updated() -> Option<ResourceTypeId> {
    TYPES_BEING_UPDATED.with(|stack| stack.borrow().last().copied())
}
