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

//! Serialization of resource handles.
//!
//! A handle is written as the id of the resource it refers to, or as `None`
//! for an invalid handle. Typeless handles also carry their type name, since
//! the reader has no static type to resolve the id against.
//!
//! Reading a handle needs a [`ResourceManager`] to resolve the id, so handles
//! are deserialized through the [`ResourceHandleSeed`] and
//! [`TypelessResourceHandleSeed`] seeds. Reading never loads anything: the
//! resource is only looked up or created, like with
//! [`ResourceManager::load_resource`].

use crate::handle::{ResourceHandle, TypedResourceHandle};
use crate::kind::ResourceKind;
use crate::manager::ResourceManager;
use serde::de::{DeserializeSeed, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::marker::PhantomData;

impl Serialize for ResourceHandle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entry = self.resource().map(|resource| (resource.type_name(), resource.id()));
        entry.serialize(serializer)
    }
}

impl<T: ResourceKind> Serialize for TypedResourceHandle<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.resource_id().serialize(serializer)
    }
}

/// Reads a [`TypedResourceHandle`] written by its `Serialize` impl.
pub struct ResourceHandleSeed<'a, T: ResourceKind> {
    manager: &'a ResourceManager,
    _kind: PhantomData<fn() -> T>,
}

impl<'a, T: ResourceKind> ResourceHandleSeed<'a, T> {
    /// Creates a seed resolving ids through `manager`.
    pub fn new(manager: &'a ResourceManager) -> Self {
        Self {
            manager,
            _kind: PhantomData,
        }
    }
}

impl<'de, T: ResourceKind> DeserializeSeed<'de> for ResourceHandleSeed<'_, T> {
    type Value = TypedResourceHandle<T>;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = Option::<String>::deserialize(deserializer)?;
        Ok(match id {
            Some(id) => self.manager.load_resource::<T>(&id),
            None => TypedResourceHandle::invalid(),
        })
    }
}

/// Reads a [`ResourceHandle`] written by its `Serialize` impl.
///
/// Fails when the stored type name is not registered or the id is empty.
pub struct TypelessResourceHandleSeed<'a> {
    manager: &'a ResourceManager,
}

impl<'a> TypelessResourceHandleSeed<'a> {
    /// Creates a seed resolving type names and ids through `manager`.
    pub fn new(manager: &'a ResourceManager) -> Self {
        Self { manager }
    }
}

impl<'de> DeserializeSeed<'de> for TypelessResourceHandleSeed<'_> {
    type Value = ResourceHandle;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some((type_name, id)) = Option::<(String, String)>::deserialize(deserializer)? else {
            return Ok(ResourceHandle::invalid());
        };

        self.manager
            .load_resource_by_type_name(&type_name, &id)
            .map_err(D::Error::custom)
    }
}
