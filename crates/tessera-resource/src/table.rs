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

//! The per-type cache index mapping id hashes to resources.

use crate::resource::Resource;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

const ID_HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hashes a resource id. The hash is stable for the lifetime of the process.
pub fn hash_resource_id(id: &str) -> u64 {
    let [k0, k1, k2, k3] = ID_HASH_SEEDS;
    ahash::RandomState::with_seeds(k0, k1, k2, k3).hash_one(id)
}

/// All live resources of one type, keyed by id hash.
///
/// The table owns its resources; a resource leaves the table only when it is
/// deallocated.
#[derive(Debug, Default)]
pub struct LoadedResourceTable {
    resources: HashMap<u64, Arc<Resource>>,
}

impl LoadedResourceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }

    /// Looks a resource up by id.
    ///
    /// A hash hit with a different id is a hash collision; it is reported and
    /// treated as a miss.
    pub fn get(&self, id: &str, id_hash: u64) -> Option<&Arc<Resource>> {
        let resource = self.resources.get(&id_hash)?;
        if resource.id() != id {
            log::error!(
                "Resource id hash collision between '{}' and '{}'.",
                resource.id(),
                id
            );
            debug_assert!(false, "resource id hash collision");
            return None;
        }
        Some(resource)
    }

    /// Inserts a resource. Returns `false`, leaving the table untouched, if a
    /// resource is already stored under the same hash.
    pub fn insert(&mut self, resource: Arc<Resource>) -> bool {
        match self.resources.entry(resource.id_hash()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(resource);
                true
            }
        }
    }

    /// Removes `resource`, if it is the one stored under its hash.
    pub fn remove(&mut self, resource: &Arc<Resource>) -> bool {
        match self.resources.get(&resource.id_hash()) {
            Some(stored) if Arc::ptr_eq(stored, resource) => {
                self.resources.remove(&resource.id_hash());
                true
            }
            _ => false,
        }
    }

    /// Number of resources in the table.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the table holds no resource.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates over all resources, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.values()
    }
}
