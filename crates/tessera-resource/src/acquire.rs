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

//! Acquisition modes and the values an acquisition hands back.

use crate::handle::ResourceHandle;
use crate::kind::ResourceKind;
use crate::loader::ResourceContent;
use crate::resource::ResourceState;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// How far an acquisition may go to produce content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireMode {
    /// Only resolve the identity. Never loads, never blocks, never substitutes.
    PointerOnly,
    /// Load on the calling thread if needed. A missing resource without a
    /// missing-fallback is reported as a failure.
    BlockTillLoaded,
    /// Like [`BlockTillLoaded`](Self::BlockTillLoaded), but a missing resource
    /// without fallback yields [`AcquireResult::None`] silently.
    BlockTillLoadedNeverFail,
    /// Return a loading fallback while the resource is not loaded yet. Blocks
    /// only when no fallback is available.
    AllowLoadingFallback,
    /// Like [`AllowLoadingFallback`](Self::AllowLoadingFallback), without the
    /// failure report for missing resources.
    AllowLoadingFallbackNeverFail,
}

impl AcquireMode {
    /// Returns `true` for the modes that may return a loading fallback.
    pub fn allows_loading_fallback(self) -> bool {
        matches!(
            self,
            AcquireMode::AllowLoadingFallback | AcquireMode::AllowLoadingFallbackNeverFail
        )
    }

    /// Returns `true` for the modes that suppress the missing-resource report.
    pub fn never_fails(self) -> bool {
        matches!(
            self,
            AcquireMode::BlockTillLoadedNeverFail | AcquireMode::AllowLoadingFallbackNeverFail
        )
    }

    /// The blocking mode with the same failure behavior.
    pub fn blocking(self) -> Self {
        match self {
            AcquireMode::AllowLoadingFallback => AcquireMode::BlockTillLoaded,
            AcquireMode::AllowLoadingFallbackNeverFail => AcquireMode::BlockTillLoadedNeverFail,
            other => other,
        }
    }
}

/// What an acquisition actually returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireResult {
    /// Nothing: the resource is missing and no fallback exists.
    None,
    /// The type's missing-fallback, standing in for a missing resource.
    MissingFallback,
    /// A loading fallback, standing in for a resource that is not loaded yet.
    LoadingFallback,
    /// The requested resource itself.
    Final,
}

/// The outcome of an acquisition: the resource that was actually returned
/// (the requested one or a fallback), how it was obtained, and a snapshot of
/// its content.
///
/// Holding an `AcquiredResource` keeps the returned resource referenced.
#[derive(Debug, Clone)]
pub struct AcquiredResource {
    handle: ResourceHandle,
    result: AcquireResult,
    content: Option<ResourceContent>,
}

impl AcquiredResource {
    pub(crate) fn new(handle: ResourceHandle, result: AcquireResult) -> Self {
        let content = handle.resource_arc().and_then(|resource| resource.content());
        Self {
            handle,
            result,
            content,
        }
    }

    pub(crate) fn none() -> Self {
        Self {
            handle: ResourceHandle::invalid(),
            result: AcquireResult::None,
            content: None,
        }
    }

    /// How the resource was obtained.
    pub fn acquire_result(&self) -> AcquireResult {
        self.result
    }

    /// Returns `true` unless the acquisition returned nothing.
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Handle to the returned resource (the fallback, when one was used).
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Id of the returned resource.
    pub fn resource_id(&self) -> Option<&str> {
        self.handle.resource_id()
    }

    /// State of the returned resource at the time of the call.
    pub fn state(&self) -> Option<ResourceState> {
        self.handle.state()
    }

    /// The content snapshot, type-erased.
    pub fn content_any(&self) -> Option<&ResourceContent> {
        self.content.as_ref()
    }

    /// The content snapshot, downcast to `C`.
    pub fn content_as<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.content
            .as_ref()
            .and_then(|content| Arc::clone(content).downcast::<C>().ok())
    }
}

/// A typed [`AcquiredResource`].
pub struct ResourceLock<T: ResourceKind> {
    inner: AcquiredResource,
    _kind: PhantomData<fn() -> T>,
}

impl<T: ResourceKind> ResourceLock<T> {
    pub(crate) fn new(inner: AcquiredResource) -> Self {
        Self {
            inner,
            _kind: PhantomData,
        }
    }

    /// The content, when the returned resource stores a `T`.
    pub fn content(&self) -> Option<Arc<T>> {
        self.inner.content_as::<T>()
    }

    /// The untyped acquisition.
    pub fn as_acquired(&self) -> &AcquiredResource {
        &self.inner
    }

    /// How the resource was obtained.
    pub fn acquire_result(&self) -> AcquireResult {
        self.inner.acquire_result()
    }

    /// Returns `true` unless the acquisition returned nothing.
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// Id of the returned resource.
    pub fn resource_id(&self) -> Option<&str> {
        self.inner.resource_id()
    }
}

impl<T: ResourceKind> Clone for ResourceLock<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T: ResourceKind> std::fmt::Debug for ResourceLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("kind", &T::TYPE_NAME)
            .field("result", &self.inner.result)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_classification() {
        assert!(AcquireMode::AllowLoadingFallback.allows_loading_fallback());
        assert!(!AcquireMode::BlockTillLoaded.allows_loading_fallback());
        assert!(AcquireMode::BlockTillLoadedNeverFail.never_fails());
        assert!(!AcquireMode::AllowLoadingFallback.never_fails());
        assert_eq!(
            AcquireMode::AllowLoadingFallbackNeverFail.blocking(),
            AcquireMode::BlockTillLoadedNeverFail
        );
        assert_eq!(AcquireMode::PointerOnly.blocking(), AcquireMode::PointerOnly);
    }

    #[test]
    fn empty_acquisition() {
        let acquired = AcquiredResource::none();
        assert_eq!(acquired.acquire_result(), AcquireResult::None);
        assert!(!acquired.is_valid());
        assert!(acquired.content_as::<u32>().is_none());
    }
}
