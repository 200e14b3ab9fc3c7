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

//! # Tessera Resource
//!
//! Handle-based resource lifecycle and caching. Resources are addressed by a
//! string id, loaded lazily through per-type loaders, substituted by fallbacks
//! while they load or when they are missing, and streamed in quality levels.
//!
//! The entry point is the [`ResourceManager`], an explicitly constructed service
//! that is passed around as a cheap clonable capability.

#![warn(missing_docs)]

pub mod acquire;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod kind;
pub mod loader;
pub mod manager;
pub mod policy;
pub mod preload;
pub mod resource;
pub mod serialization;
pub mod table;
mod worker;

pub use acquire::{AcquireMode, AcquireResult, AcquiredResource, ResourceLock};
pub use config::{AutoFreeConfig, FailurePolicy, ResourceManagerConfig};
pub use error::ResourceError;
pub use events::{ListenerId, ResourceEvent, ResourceEventInfo, ResourceEventListener};
pub use handle::{ResourceHandle, TypedResourceHandle};
pub use kind::{CreateFromDescriptor, RegisterResourceKind, ResourceKind};
pub use loader::{loader_fn, LoadError, LoadRequest, ResourceContent, ResourceLoadDesc, ResourceTypeLoader};
pub use manager::{CleanupCallback, CleanupCallbackId, ResourceManager};
pub use resource::{Resource, ResourceFlags, ResourcePriority, ResourceState};
pub use serialization::{ResourceHandleSeed, TypelessResourceHandleSeed};
