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

//! Per-type loader callbacks and the data they exchange with the manager.
//!
//! Loaders are the decoding boundary of the resource system: the manager
//! decides *when* a resource loads, a [`ResourceTypeLoader`] decides *what* the
//! content is. A loader runs without the manager lock held and may itself load
//! or acquire other resources through [`LoadRequest::manager`].

use crate::manager::ResourceManager;
use crate::resource::{Resource, ResourceState};
use std::any::Any;
use std::sync::Arc;
use tessera_core::ResourceTypeId;

/// Type-erased, shared resource content.
pub type ResourceContent = Arc<dyn Any + Send + Sync>;

/// Error type returned by loaders. Any failure marks the resource missing.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// The result of one successful loader invocation.
#[derive(Clone)]
pub struct ResourceLoadDesc {
    /// The content to publish.
    pub content: ResourceContent,
    /// Quality levels present in `content` that could be dropped again.
    pub quality_levels_discardable: u8,
    /// Quality levels that can still be loaded on top of `content`.
    pub quality_levels_loadable: u8,
}

impl ResourceLoadDesc {
    /// Wraps fully loaded content without further quality levels.
    pub fn new<T: Any + Send + Sync>(content: T) -> Self {
        Self::from_shared(Arc::new(content))
    }

    /// Wraps already shared content.
    pub fn from_shared(content: ResourceContent) -> Self {
        Self {
            content,
            quality_levels_discardable: 0,
            quality_levels_loadable: 0,
        }
    }

    /// Sets the quality level counters.
    #[must_use]
    pub fn with_quality_levels(mut self, discardable: u8, loadable: u8) -> Self {
        self.quality_levels_discardable = discardable;
        self.quality_levels_loadable = loadable;
        self
    }
}

/// Everything a loader gets to know about the resource it is loading.
pub struct LoadRequest {
    resource: Arc<Resource>,
    current_content: Option<ResourceContent>,
    manager: ResourceManager,
}

impl LoadRequest {
    pub(crate) fn new(resource: Arc<Resource>, manager: ResourceManager) -> Self {
        let current_content = resource.content();
        Self {
            resource,
            current_content,
            manager,
        }
    }

    /// The id of the resource being loaded.
    pub fn resource_id(&self) -> &str {
        self.resource.id()
    }

    /// The dynamic type of the resource being loaded.
    pub fn resource_type(&self) -> ResourceTypeId {
        self.resource.resource_type()
    }

    /// The resource record itself, for read-only inspection.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Returns `true` if the resource is already loaded and this call should
    /// stream in the next quality level.
    pub fn is_quality_upgrade(&self) -> bool {
        self.resource.state() == ResourceState::Loaded && self.current_content.is_some()
    }

    /// Content published by a previous load, if any.
    pub fn current_content(&self) -> Option<&ResourceContent> {
        self.current_content.as_ref()
    }

    /// Content published by a previous load, downcast to `T`.
    pub fn current_content_as<T: Any>(&self) -> Option<&T> {
        self.current_content
            .as_ref()
            .and_then(|content| content.downcast_ref::<T>())
    }

    /// The manager driving this load.
    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }
}

/// Produces the content of resources of one type.
pub trait ResourceTypeLoader: Send + Sync {
    /// Loads the resource described by `request`.
    ///
    /// Called again for every remaining quality level; `request` then carries
    /// the previously published content.
    fn load(&self, request: &LoadRequest) -> Result<ResourceLoadDesc, LoadError>;

    /// Tells whether a non-forced reload of `resource` should happen.
    ///
    /// Called with the manager lock held; implementations must not call back
    /// into the manager.
    fn is_outdated(&self, resource: &Resource) -> bool {
        let _ = resource;
        true
    }

    /// Restores content that was modified at runtime to its loaded state.
    ///
    /// `request` carries the current content. Called from
    /// [`ResourceManager::reset_all_resources`]; does nothing by default.
    fn reset(&self, request: &LoadRequest) {
        let _ = request;
    }
}

/// A [`ResourceTypeLoader`] backed by a closure. See [`loader_fn`].
pub struct LoaderFn<F>(F);

/// Turns a closure into a [`ResourceTypeLoader`].
pub fn loader_fn<F>(load: F) -> LoaderFn<F>
where
    F: Fn(&LoadRequest) -> Result<ResourceLoadDesc, LoadError> + Send + Sync + 'static,
{
    LoaderFn(load)
}

impl<F> ResourceTypeLoader for LoaderFn<F>
where
    F: Fn(&LoadRequest) -> Result<ResourceLoadDesc, LoadError> + Send + Sync,
{
    fn load(&self, request: &LoadRequest) -> Result<ResourceLoadDesc, LoadError> {
        (self.0)(request)
    }
}
