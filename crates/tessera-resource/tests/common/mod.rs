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

//! Shared fixtures: a small texture and material hierarchy and their loaders.

#![allow(dead_code)]

use std::sync::Arc;
use tessera_core::ResourceTypeRegistry;
use tessera_resource::{
    loader_fn, CreateFromDescriptor, FailurePolicy, LoadError, LoadRequest, RegisterResourceKind,
    ResourceKind, ResourceLoadDesc, ResourceManager, ResourceManagerConfig, ResourceTypeLoader,
};

/// Base of every texture kind. Only used as a handle type.
pub struct Texture;

impl ResourceKind for Texture {
    const TYPE_NAME: &'static str = "Texture";
    const IS_ABSTRACT: bool = true;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture2D {
    pub name: String,
    pub quality: u8,
}

impl ResourceKind for Texture2D {
    const TYPE_NAME: &'static str = "Texture2D";
    const PARENT_TYPE_NAME: Option<&'static str> = Some("Texture");
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecalTexture {
    pub name: String,
}

impl ResourceKind for DecalTexture {
    const TYPE_NAME: &'static str = "DecalTexture";
    const PARENT_TYPE_NAME: Option<&'static str> = Some("Texture2D");
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: String,
}

impl ResourceKind for Material {
    const TYPE_NAME: &'static str = "Material";
}

impl CreateFromDescriptor for Material {
    type Descriptor = String;

    fn create(descriptor: String, _request: &LoadRequest) -> Result<ResourceLoadDesc, LoadError> {
        Ok(ResourceLoadDesc::new(Material {
            base_color: descriptor,
        }))
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn registry() -> Arc<ResourceTypeRegistry> {
    let registry = ResourceTypeRegistry::new();
    registry.register_kind::<Texture>();
    registry.register_kind::<Texture2D>();
    registry.register_kind::<DecalTexture>();
    registry.register_kind::<Material>();
    Arc::new(registry)
}

/// A manager without loader threads that logs missing resources.
pub fn synchronous_manager() -> ResourceManager {
    manager_with(ResourceManagerConfig {
        failure_policy: FailurePolicy::Log,
        ..ResourceManagerConfig::synchronous()
    })
}

pub fn manager_with(config: ResourceManagerConfig) -> ResourceManager {
    init_logger();
    ResourceManager::new(registry(), config)
}

/// Loads a `Texture2D` named after the id. Ids containing "missing" fail.
pub fn texture_loader() -> impl ResourceTypeLoader {
    loader_fn(|request: &LoadRequest| {
        if request.resource_id().contains("missing") {
            return Err(format!("'{}' not found", request.resource_id()).into());
        }
        Ok(ResourceLoadDesc::new(Texture2D {
            name: request.resource_id().to_string(),
            quality: 0,
        }))
    })
}

/// A synchronous manager with the texture loader installed.
pub fn texture_manager() -> ResourceManager {
    let manager = synchronous_manager();
    manager.set_loader_for::<Texture2D>(texture_loader());
    manager
}
