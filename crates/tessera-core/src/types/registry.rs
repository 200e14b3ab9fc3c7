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

use super::ResourceTypeId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Upper bound on parent-chain walks; deeper chains are treated as cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Static description of a registered resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Human readable, unique type name.
    pub name: String,
    /// The direct base type, if any.
    pub parent: Option<ResourceTypeId>,
    /// Abstract types can be referenced by handles but never instantiated.
    pub is_abstract: bool,
}

/// The type identity and derivation oracle.
///
/// Implementations only need to answer the three required queries; the provided
/// methods derive everything else (ancestry, derived type sets) from them.
pub trait TypeRegistry: Send + Sync {
    /// Returns the description of `id`, or `None` if it is unknown.
    fn type_info(&self, id: ResourceTypeId) -> Option<TypeInfo>;

    /// Resolves a type by its registered name.
    fn lookup_by_name(&self, name: &str) -> Option<ResourceTypeId>;

    /// Returns every registered type, in no particular order.
    fn registered_types(&self) -> Vec<ResourceTypeId>;

    /// Returns the registered name of `id`.
    fn type_name(&self, id: ResourceTypeId) -> Option<String> {
        self.type_info(id).map(|info| info.name)
    }

    /// Returns the direct base type of `id`.
    fn parent(&self, id: ResourceTypeId) -> Option<ResourceTypeId> {
        self.type_info(id).and_then(|info| info.parent)
    }

    /// Returns `true` if `id` is registered as abstract.
    fn is_abstract(&self, id: ResourceTypeId) -> bool {
        self.type_info(id).is_some_and(|info| info.is_abstract)
    }

    /// Returns `true` if `id` equals `base` or has `base` among its ancestors.
    fn is_derived_from(&self, id: ResourceTypeId, base: ResourceTypeId) -> bool {
        let mut current = Some(id);
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match current {
                Some(ty) if ty == base => return true,
                Some(ty) => current = self.parent(ty),
                None => return false,
            }
        }
        log::error!("Type hierarchy of '{id}' exceeds {MAX_HIERARCHY_DEPTH} levels, assuming a cycle.");
        false
    }

    /// Returns `id` followed by all of its ancestors, most derived first.
    fn ancestry(&self, id: ResourceTypeId) -> Vec<ResourceTypeId> {
        let mut chain = vec![id];
        while chain.len() < MAX_HIERARCHY_DEPTH {
            match chain.last().and_then(|ty| self.parent(*ty)) {
                Some(parent) => chain.push(parent),
                None => break,
            }
        }
        chain
    }

    /// Returns every registered type that derives from `base`, `base` included.
    fn derived_types(&self, base: ResourceTypeId) -> Vec<ResourceTypeId> {
        self.registered_types()
            .into_iter()
            .filter(|ty| self.is_derived_from(*ty, base))
            .collect()
    }
}

/// A thread-safe, in-memory [`TypeRegistry`].
///
/// Types are usually registered once at startup; lookups afterwards only take
/// a shared read lock.
#[derive(Debug, Default)]
pub struct ResourceTypeRegistry {
    types: RwLock<HashMap<ResourceTypeId, TypeInfo>>,
}

impl ResourceTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a concrete type called `name`, optionally deriving from `parent`.
    ///
    /// ## Returns
    /// The stable identifier of the type.
    pub fn register(&self, name: &str, parent: Option<ResourceTypeId>) -> ResourceTypeId {
        self.insert(name, parent, false)
    }

    /// Registers an abstract type, which cannot be instantiated.
    pub fn register_abstract(&self, name: &str, parent: Option<ResourceTypeId>) -> ResourceTypeId {
        self.insert(name, parent, true)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no type has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, name: &str, parent: Option<ResourceTypeId>, is_abstract: bool) -> ResourceTypeId {
        let id = ResourceTypeId::from_name(name);
        let info = TypeInfo {
            name: name.to_string(),
            parent,
            is_abstract,
        };

        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = parent {
            if !types.contains_key(&parent) {
                log::warn!("Type '{name}' registered with an unknown parent type '{parent}'.");
            }
        }

        match types.insert(id, info.clone()) {
            Some(previous) if previous != info => {
                log::warn!("Type '{name}' was re-registered with a different description.");
            }
            Some(_) => {}
            None => log::trace!("Registered resource type '{name}'."),
        }

        id
    }
}

impl TypeRegistry for ResourceTypeRegistry {
    fn type_info(&self, id: ResourceTypeId) -> Option<TypeInfo> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn lookup_by_name(&self, name: &str) -> Option<ResourceTypeId> {
        let id = ResourceTypeId::from_name(name);
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
            .then_some(id)
    }

    fn registered_types(&self) -> Vec<ResourceTypeId> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}
