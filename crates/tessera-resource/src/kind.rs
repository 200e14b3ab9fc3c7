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

//! Static description of resource types.

use crate::loader::{LoadError, LoadRequest, ResourceLoadDesc};
use std::any::Any;
use tessera_core::{ResourceTypeId, ResourceTypeRegistry};

/// A Rust type that can be managed as resource content.
///
/// The type name is the stable identity of the kind; it is what handles
/// serialize and what the [`TypeRegistry`](tessera_core::TypeRegistry) knows.
pub trait ResourceKind: Any + Send + Sync + Sized {
    /// Unique, stable name of the kind.
    const TYPE_NAME: &'static str;

    /// Name of the kind this one derives from.
    const PARENT_TYPE_NAME: Option<&'static str> = None;

    /// Abstract kinds are only used as handle types; they are never instantiated.
    const IS_ABSTRACT: bool = false;

    /// The stable identifier of the kind.
    fn resource_type() -> ResourceTypeId {
        ResourceTypeId::from_name(Self::TYPE_NAME)
    }
}

/// A kind that can be created in place from a descriptor instead of being loaded.
pub trait CreateFromDescriptor: ResourceKind {
    /// Everything needed to build the content.
    type Descriptor: Send;

    /// Builds the content. Runs synchronously on the calling thread.
    fn create(descriptor: Self::Descriptor, request: &LoadRequest) -> Result<ResourceLoadDesc, LoadError>;
}

/// Registers [`ResourceKind`]s with a type registry.
pub trait RegisterResourceKind {
    /// Registers `T` (and its declared parent link) and returns its identifier.
    fn register_kind<T: ResourceKind>(&self) -> ResourceTypeId;
}

impl RegisterResourceKind for ResourceTypeRegistry {
    fn register_kind<T: ResourceKind>(&self) -> ResourceTypeId {
        let parent = T::PARENT_TYPE_NAME.map(ResourceTypeId::from_name);
        if T::IS_ABSTRACT {
            self.register_abstract(T::TYPE_NAME, parent)
        } else {
            self.register(T::TYPE_NAME, parent)
        }
    }
}
