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

//! Reference-counted handles to resources.
//!
//! A [`ResourceHandle`] is the only way code outside the manager refers to a
//! resource. Handles compare, order and hash by identity, so they can be used
//! as map keys, and they keep the referenced [`Resource`] alive (never its
//! content) until the last one is dropped.

use crate::error::ResourceError;
use crate::kind::ResourceKind;
use crate::resource::{Resource, ResourceState};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use tessera_core::{ResourceTypeId, TypeRegistry};

/// A typeless, reference-counted link to one resource, or empty.
///
/// Cloning increments the resource's reference count, dropping or
/// [`invalidate`](ResourceHandle::invalidate)-ing decrements it. Moving a
/// handle leaves the count untouched.
pub struct ResourceHandle {
    resource: Option<Arc<Resource>>,
}

impl ResourceHandle {
    pub(crate) fn new(resource: Arc<Resource>) -> Self {
        resource.increment_ref();
        Self {
            resource: Some(resource),
        }
    }

    /// Creates an empty handle.
    pub const fn invalid() -> Self {
        Self { resource: None }
    }

    /// Returns `true` if the handle references a resource.
    pub fn is_valid(&self) -> bool {
        self.resource.is_some()
    }

    /// Releases the referenced resource and leaves the handle empty.
    pub fn invalidate(&mut self) {
        if let Some(resource) = self.resource.take() {
            resource.decrement_ref();
        }
    }

    /// The id of the referenced resource.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource.as_deref().map(Resource::id)
    }

    /// The dynamic type of the referenced resource.
    pub fn resource_type(&self) -> Option<ResourceTypeId> {
        self.resource.as_deref().map(Resource::resource_type)
    }

    /// The registered type name of the referenced resource.
    pub fn type_name(&self) -> Option<&str> {
        self.resource.as_deref().map(Resource::type_name)
    }

    /// The loading state of the referenced resource.
    pub fn state(&self) -> Option<ResourceState> {
        self.resource.as_deref().map(Resource::state)
    }

    /// Number of live handles to the referenced resource, `0` when empty.
    pub fn ref_count(&self) -> u32 {
        self.resource.as_deref().map_or(0, Resource::ref_count)
    }

    /// Read-only view of the referenced resource record.
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_deref()
    }

    pub(crate) fn resource_arc(&self) -> Option<&Arc<Resource>> {
        self.resource.as_ref()
    }

    fn address(&self) -> usize {
        self.resource
            .as_ref()
            .map_or(0, |resource| Arc::as_ptr(resource) as usize)
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Clone for ResourceHandle {
    fn clone(&self) -> Self {
        match &self.resource {
            Some(resource) => Self::new(Arc::clone(resource)),
            None => Self::invalid(),
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ResourceHandle {}

impl PartialOrd for ResourceHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "ResourceHandle({}: '{}')", resource.type_name(), resource.id()),
            None => f.write_str("ResourceHandle(invalid)"),
        }
    }
}

/// A [`ResourceHandle`] whose resource is statically known to be a `T`.
///
/// The dynamic type of the referenced resource equals `T` or derives from it.
/// The relationship is validated whenever a handle crosses a type boundary.
pub struct TypedResourceHandle<T: ResourceKind> {
    handle: ResourceHandle,
    _kind: PhantomData<fn() -> T>,
}

impl<T: ResourceKind> TypedResourceHandle<T> {
    /// Creates an empty handle.
    pub const fn invalid() -> Self {
        Self {
            handle: ResourceHandle::invalid(),
            _kind: PhantomData,
        }
    }

    pub(crate) fn from_typeless_unchecked(handle: ResourceHandle) -> Self {
        Self {
            handle,
            _kind: PhantomData,
        }
    }

    /// Converts a typeless handle, checking that its resource is a `T`.
    ///
    /// Empty handles always convert.
    pub fn try_from_typeless(
        handle: ResourceHandle,
        registry: &dyn TypeRegistry,
    ) -> Result<Self, ResourceError> {
        let Some(resource) = handle.resource() else {
            return Ok(Self::invalid());
        };

        let expected = T::resource_type();
        if !registry.is_derived_from(resource.resource_type(), expected) {
            return Err(ResourceError::TypeMismatch {
                resource_id: resource.id().to_string(),
                actual: resource.type_name().to_string(),
                expected: T::TYPE_NAME.to_string(),
            });
        }

        Ok(Self::from_typeless_unchecked(handle))
    }

    /// Converts a typeless handle; a type mismatch is a programming error.
    ///
    /// Panics in debug builds. Release builds log the mismatch and return an
    /// empty handle.
    pub fn from_typeless(handle: ResourceHandle, registry: &dyn TypeRegistry) -> Self {
        match Self::try_from_typeless(handle, registry) {
            Ok(typed) => typed,
            Err(err) => {
                debug_assert!(false, "{err}");
                log::error!("{err}");
                Self::invalid()
            }
        }
    }

    /// Converts to a handle of a related kind `U`, validating the derivation.
    pub fn cast<U: ResourceKind>(&self, registry: &dyn TypeRegistry) -> TypedResourceHandle<U> {
        TypedResourceHandle::<U>::from_typeless(self.handle.clone(), registry)
    }

    /// The typeless view of this handle.
    pub fn as_typeless(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Drops the static type information.
    pub fn into_typeless(self) -> ResourceHandle {
        self.handle
    }

    /// Releases the referenced resource and leaves the handle empty.
    pub fn invalidate(&mut self) {
        self.handle.invalidate();
    }
}

impl<T: ResourceKind> Deref for TypedResourceHandle<T> {
    type Target = ResourceHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<T: ResourceKind> Default for TypedResourceHandle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: ResourceKind> Clone for TypedResourceHandle<T> {
    fn clone(&self) -> Self {
        Self::from_typeless_unchecked(self.handle.clone())
    }
}

impl<T: ResourceKind> PartialEq for TypedResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T: ResourceKind> Eq for TypedResourceHandle<T> {}

impl<T: ResourceKind> PartialOrd for TypedResourceHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ResourceKind> Ord for TypedResourceHandle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.handle.cmp(&other.handle)
    }
}

impl<T: ResourceKind> Hash for TypedResourceHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T: ResourceKind> PartialEq<ResourceHandle> for TypedResourceHandle<T> {
    fn eq(&self, other: &ResourceHandle) -> bool {
        &self.handle == other
    }
}

impl<T: ResourceKind> From<TypedResourceHandle<T>> for ResourceHandle {
    fn from(handle: TypedResourceHandle<T>) -> Self {
        handle.into_typeless()
    }
}

impl<T: ResourceKind> fmt::Debug for TypedResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedResourceHandle<{}>({:?})", T::TYPE_NAME, self.handle)
    }
}
