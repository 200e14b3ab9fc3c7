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

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for name-based (version 5) type UUIDs.
const TYPE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1e, 0x2f, 0x49, 0x0d, 0x7a, 0x4c, 0x51, 0x9a, 0x3e, 0x51, 0x07, 0xc2, 0x88, 0x14, 0xd3,
]);

/// A stable identifier for a resource type.
///
/// The identifier is a version 5 UUID computed from the type name, so two
/// registries that know the same type name agree on its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceTypeId(Uuid);

impl ResourceTypeId {
    /// Computes the identifier of the type called `name`.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&TYPE_NAMESPACE, name.as_bytes()))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
