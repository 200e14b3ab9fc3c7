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

//! The [`Resource`] record: one addressable content object and its bookkeeping.
//!
//! A `Resource` is owned by its type's [`LoadedResourceTable`](crate::table::LoadedResourceTable).
//! Handles pin it through an explicit reference count; the content it carries
//! can come and go independently of the record itself.

use crate::handle::ResourceHandle;
use crate::loader::{ResourceContent, ResourceLoadDesc};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tessera_core::ResourceTypeId;

/// Loading state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceState {
    /// No content. The initial state, and the state after an unload.
    Unloaded = 0,
    /// A loader is currently producing the first content of the resource.
    Loading = 1,
    /// Content is available, possibly with more quality levels to stream in.
    Loaded = 2,
    /// The loader failed; the resource is permanently missing until reloaded.
    LoadedResourceMissing = 3,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ResourceState::Loading,
            2 => ResourceState::Loaded,
            3 => ResourceState::LoadedResourceMissing,
            _ => ResourceState::Unloaded,
        }
    }
}

/// Bookkeeping flags of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceFlags {
    bits: u32,
}

impl ResourceFlags {
    /// No flag set.
    pub const NONE: Self = Self { bits: 0 };
    /// The resource may be reloaded from its loader.
    pub const IS_RELOADABLE: Self = Self { bits: 1 << 0 };
    /// The resource was created from a descriptor, not loaded.
    pub const IS_CREATED_RESOURCE: Self = Self { bits: 1 << 1 };
    /// The resource is in the preload queue or a loader is running on it.
    pub const IS_QUEUED_FOR_LOADING: Self = Self { bits: 1 << 2 };
    /// A per-resource loader overrides the type loader.
    pub const HAS_CUSTOM_LOADER: Self = Self { bits: 1 << 3 };
    /// Non-forced reloads are ignored.
    pub const PREVENT_FILE_RELOAD: Self = Self { bits: 1 << 4 };
    /// A resource-specific loading fallback is configured.
    pub const HAS_LOADING_FALLBACK: Self = Self { bits: 1 << 5 };

    /// Creates a set of flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Checks whether every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Checks whether no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for ResourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Relative loading priority. Lower variants are loaded first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ResourcePriority {
    /// Needed right now; set on resources requested by blocking acquisitions.
    Critical = 0,
    /// Needed very soon.
    VeryHigh = 1,
    /// Needed soon.
    High = 2,
    /// The default.
    #[default]
    Medium = 3,
    /// Can wait.
    Low = 4,
    /// Load when nothing else is pending.
    VeryLow = 5,
}

impl ResourcePriority {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResourcePriority::Critical,
            1 => ResourcePriority::VeryHigh,
            2 => ResourcePriority::High,
            4 => ResourcePriority::Low,
            5 => ResourcePriority::VeryLow,
            _ => ResourcePriority::Medium,
        }
    }
}

/// One addressable, cacheable content object.
pub struct Resource {
    id: String,
    id_hash: u64,
    type_id: ResourceTypeId,
    type_name: Arc<str>,
    description: RwLock<String>,
    state: AtomicU8,
    quality_levels_discardable: AtomicU8,
    quality_levels_loadable: AtomicU8,
    flags: AtomicU32,
    priority: AtomicU8,
    ref_count: AtomicU32,
    last_acquired_ms: AtomicU64,
    change_counter: AtomicU32,
    content: RwLock<Option<ResourceContent>>,
    loading_fallback: Mutex<Option<ResourceHandle>>,
}

impl Resource {
    pub(crate) fn new(
        id: &str,
        id_hash: u64,
        type_id: ResourceTypeId,
        type_name: Arc<str>,
        priority: ResourcePriority,
    ) -> Self {
        Self {
            id: id.to_string(),
            id_hash,
            type_id,
            type_name,
            description: RwLock::new(String::new()),
            state: AtomicU8::new(ResourceState::Unloaded as u8),
            quality_levels_discardable: AtomicU8::new(0),
            quality_levels_loadable: AtomicU8::new(0),
            flags: AtomicU32::new(ResourceFlags::IS_RELOADABLE.bits()),
            priority: AtomicU8::new(priority as u8),
            ref_count: AtomicU32::new(0),
            last_acquired_ms: AtomicU64::new(0),
            change_counter: AtomicU32::new(0),
            content: RwLock::new(None),
            loading_fallback: Mutex::new(None),
        }
    }

    /// The unique id of the resource within its type.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The hash of [`id`](Self::id) used as table key.
    pub fn id_hash(&self) -> u64 {
        self.id_hash
    }

    /// The dynamic type of the resource.
    pub fn resource_type(&self) -> ResourceTypeId {
        self.type_id
    }

    /// The registered name of the dynamic type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// A human readable label, typically a path or a creation site.
    pub fn description(&self) -> String {
        self.description
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_description(&self, description: &str) {
        *self
            .description
            .write()
            .unwrap_or_else(PoisonError::into_inner) = description.to_string();
    }

    /// The current loading state.
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Quality levels that could be dropped without unloading the resource.
    pub fn quality_levels_discardable(&self) -> u8 {
        self.quality_levels_discardable.load(Ordering::Acquire)
    }

    /// Quality levels that can still be streamed in.
    pub fn quality_levels_loadable(&self) -> u8 {
        self.quality_levels_loadable.load(Ordering::Acquire)
    }

    /// The current flag set.
    pub fn flags(&self) -> ResourceFlags {
        ResourceFlags::from_bits(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn add_flags(&self, flags: ResourceFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_flags(&self, flags: ResourceFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Shorthand for the [`ResourceFlags::IS_QUEUED_FOR_LOADING`] flag.
    pub fn is_queued_for_loading(&self) -> bool {
        self.flags().contains(ResourceFlags::IS_QUEUED_FOR_LOADING)
    }

    /// The loading priority.
    pub fn priority(&self) -> ResourcePriority {
        ResourcePriority::from_u8(self.priority.load(Ordering::Acquire))
    }

    pub(crate) fn set_priority(&self, priority: ResourcePriority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    /// Number of live handles referencing this resource.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_ref(&self) {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "Reference count of '{}' underflowed", self.id);
    }

    /// Manager clock time of the last non-pointer acquisition, in milliseconds.
    pub fn last_acquired_ms(&self) -> u64 {
        self.last_acquired_ms.load(Ordering::Acquire)
    }

    pub(crate) fn touch(&self, now_ms: u64) {
        self.last_acquired_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    /// Incremented every time new content is applied.
    pub fn change_counter(&self) -> u32 {
        self.change_counter.load(Ordering::Acquire)
    }

    /// Returns `true` if content is currently available.
    pub fn has_content(&self) -> bool {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Lower values are loaded first. Recently used resources of the same
    /// priority class win over stale ones.
    pub fn loading_priority(&self, now_ms: u64) -> f32 {
        let idle_secs = now_ms.saturating_sub(self.last_acquired_ms()) as f32 / 1000.0;
        self.priority() as u8 as f32 * 10.0 + idle_secs.min(10.0)
    }

    pub(crate) fn content(&self) -> Option<ResourceContent> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies the outcome of a successful load or creation.
    pub(crate) fn apply_load(&self, desc: ResourceLoadDesc) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = Some(desc.content);
        self.quality_levels_discardable
            .store(desc.quality_levels_discardable, Ordering::Release);
        self.quality_levels_loadable
            .store(desc.quality_levels_loadable, Ordering::Release);
        self.change_counter.fetch_add(1, Ordering::AcqRel);
        self.set_state(ResourceState::Loaded);
    }

    /// Marks the resource missing. Content from a previous load is dropped.
    pub(crate) fn mark_missing(&self) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.quality_levels_discardable.store(0, Ordering::Release);
        self.quality_levels_loadable.store(0, Ordering::Release);
        self.set_state(ResourceState::LoadedResourceMissing);
    }

    /// Stops quality streaming after a failed upgrade; the loaded content stays.
    pub(crate) fn stop_streaming(&self) {
        self.quality_levels_loadable.store(0, Ordering::Release);
    }

    /// Drops all content and returns to [`ResourceState::Unloaded`].
    pub(crate) fn unload_content(&self) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.quality_levels_discardable.store(0, Ordering::Release);
        self.quality_levels_loadable.store(0, Ordering::Release);
        self.set_state(ResourceState::Unloaded);
    }

    /// The resource-specific loading fallback, if any.
    pub fn loading_fallback(&self) -> Option<ResourceHandle> {
        self.loading_fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_loading_fallback(&self, fallback: Option<ResourceHandle>) {
        let has_fallback = fallback.as_ref().is_some_and(ResourceHandle::is_valid);
        let previous = std::mem::replace(
            &mut *self
                .loading_fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            fallback.filter(ResourceHandle::is_valid),
        );
        drop(previous);

        if has_fallback {
            self.add_flags(ResourceFlags::HAS_LOADING_FALLBACK);
        } else {
            self.remove_flags(ResourceFlags::HAS_LOADING_FALLBACK);
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .field("flags", &self.flags())
            .finish()
    }
}
