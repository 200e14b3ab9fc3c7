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

//! Id resolution and resource creation.

use super::{ManagerState, ResourceManager};
use crate::error::ResourceError;
use crate::events::{ResourceEvent, ResourceEventInfo};
use crate::handle::{ResourceHandle, TypedResourceHandle};
use crate::kind::{CreateFromDescriptor, ResourceKind};
use crate::loader::{LoadRequest, ResourceTypeLoader};
use crate::resource::{Resource, ResourceFlags, ResourcePriority, ResourceState};
use crate::table::hash_resource_id;
use std::sync::Arc;
use tessera_core::ResourceTypeId;

impl ResourceManager {
    /// Finds, or creates when `allow_create` is set, the resource `id` of type
    /// `requested` or of the type an override redirects it to.
    ///
    /// The requested type's table is searched before overrides are resolved,
    /// so a resource created before an override was registered stays
    /// reachable under its id.
    ///
    /// Must be called with the manager lock held; this is what makes lookups
    /// race-free.
    pub(crate) fn get_resource_locked(
        &self,
        state: &mut ManagerState,
        requested: ResourceTypeId,
        id: &str,
        allow_create: bool,
    ) -> Option<Arc<Resource>> {
        if id.is_empty() {
            return None;
        }

        let id = state
            .named_resources
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string());
        let id_hash = hash_resource_id(&id);

        let lookup = |state: &ManagerState, ty: ResourceTypeId| {
            state
                .tables
                .get(&ty)
                .and_then(|table| table.get(&id, id_hash))
                .cloned()
        };

        if let Some(existing) = lookup(state, requested) {
            return Some(existing);
        }

        let resolved = state.overrides.resolve(requested, &id);
        if resolved != requested {
            if let Some(existing) = lookup(state, resolved) {
                return Some(existing);
            }
        }

        if !allow_create {
            return None;
        }

        let registry = self.registry();
        if registry.is_abstract(resolved) {
            log::error!(
                "Cannot create resource '{id}': type '{}' is abstract.",
                registry.type_name(resolved).unwrap_or_default()
            );
            return None;
        }

        let type_name = registry.type_name(resolved).unwrap_or_else(|| {
            log::warn!("Resource '{id}' uses the unregistered type '{resolved}'.");
            resolved.to_string()
        });

        let priority = state
            .policy(resolved)
            .map_or(ResourcePriority::Medium, |policy| policy.default_priority);

        let resource = Arc::new(Resource::new(
            &id,
            id_hash,
            resolved,
            Arc::from(type_name),
            priority,
        ));
        let inserted = state
            .tables
            .entry(resolved)
            .or_default()
            .insert(Arc::clone(&resource));
        if !inserted {
            log::error!("Cannot create resource '{id}': its id hash is taken by another resource.");
            return None;
        }

        log::trace!("Created resource '{}' ({}).", id, resource.type_name());
        self.publish(ResourceEvent::Created(ResourceEventInfo::from(resource.as_ref())));

        Some(resource)
    }

    /// Returns a handle to the resource `id` of type `T`, creating the
    /// resource (unloaded) if it does not exist yet.
    ///
    /// Nothing is loaded until the resource is acquired or preloaded.
    pub fn load_resource<T: ResourceKind>(&self, id: &str) -> TypedResourceHandle<T> {
        TypedResourceHandle::from_typeless_unchecked(self.load_resource_by_type(T::resource_type(), id))
    }

    /// Same as [`load_resource`](Self::load_resource), and additionally sets
    /// the resource-specific loading fallback.
    pub fn load_resource_with_fallback<T: ResourceKind>(
        &self,
        id: &str,
        loading_fallback: TypedResourceHandle<T>,
    ) -> TypedResourceHandle<T> {
        let handle = self.load_resource::<T>(id);
        if let Some(resource) = handle.resource() {
            if loading_fallback.is_valid() {
                resource.set_loading_fallback(Some(loading_fallback.into_typeless()));
            }
        }
        handle
    }

    /// Typeless variant of [`load_resource`](Self::load_resource).
    pub fn load_resource_by_type(&self, resource_type: ResourceTypeId, id: &str) -> ResourceHandle {
        let mut state = self.lock_state();
        self.get_resource_locked(&mut state, resource_type, id, true)
            .map(ResourceHandle::new)
            .unwrap_or_default()
    }

    /// Typeless lookup-or-create by registered type name.
    ///
    /// Fails when the type name is unknown or the resource cannot be created.
    pub fn load_resource_by_type_name(&self, type_name: &str, id: &str) -> Result<ResourceHandle, ResourceError> {
        let resource_type = self
            .registry()
            .lookup_by_name(type_name)
            .ok_or_else(|| ResourceError::UnknownType(type_name.to_string()))?;

        let handle = self.load_resource_by_type(resource_type, id);
        if handle.is_valid() {
            Ok(handle)
        } else {
            Err(ResourceError::Unresolved(id.to_string()))
        }
    }

    /// Returns a handle to the resource `id` of type `T` if it exists.
    pub fn get_existing_resource<T: ResourceKind>(&self, id: &str) -> TypedResourceHandle<T> {
        TypedResourceHandle::from_typeless_unchecked(
            self.get_existing_resource_by_type(T::resource_type(), id),
        )
    }

    /// Typeless variant of [`get_existing_resource`](Self::get_existing_resource).
    pub fn get_existing_resource_by_type(&self, resource_type: ResourceTypeId, id: &str) -> ResourceHandle {
        let mut state = self.lock_state();
        self.get_resource_locked(&mut state, resource_type, id, false)
            .map(ResourceHandle::new)
            .unwrap_or_default()
    }

    /// Returns the existing resource `id`, or creates one whose content comes
    /// from `loader` instead of the type loader. Loading starts on first use.
    pub fn get_existing_resource_or_create_async(
        &self,
        resource_type: ResourceTypeId,
        id: &str,
        loader: impl ResourceTypeLoader + 'static,
    ) -> ResourceHandle {
        let mut state = self.lock_state();

        if let Some(existing) = self.get_resource_locked(&mut state, resource_type, id, false) {
            return ResourceHandle::new(existing);
        }

        let Some(resource) = self.get_resource_locked(&mut state, resource_type, id, true) else {
            return ResourceHandle::invalid();
        };

        resource.add_flags(ResourceFlags::HAS_CUSTOM_LOADER | ResourceFlags::IS_CREATED_RESOURCE);
        state.custom_loaders.insert(
            (resource.resource_type(), resource.id_hash()),
            Arc::new(loader),
        );

        ResourceHandle::new(resource)
    }

    /// Typed variant of
    /// [`get_existing_resource_or_create_async`](Self::get_existing_resource_or_create_async)
    /// that also sets a resource-specific loading fallback on creation.
    pub fn get_existing_or_create_async<T: ResourceKind>(
        &self,
        id: &str,
        loader: impl ResourceTypeLoader + 'static,
        loading_fallback: Option<TypedResourceHandle<T>>,
    ) -> TypedResourceHandle<T> {
        let handle = self.get_existing_resource_or_create_async(T::resource_type(), id, loader);
        if let (Some(resource), Some(fallback)) = (handle.resource(), loading_fallback) {
            if resource.loading_fallback().is_none() && fallback.is_valid() {
                resource.set_loading_fallback(Some(fallback.into_typeless()));
            }
        }
        TypedResourceHandle::from_typeless_unchecked(handle)
    }

    /// Creates the resource `id` from `descriptor`, synchronously.
    ///
    /// Creating a resource that was already created or loaded is a programming
    /// error: it panics in debug builds and returns the existing resource
    /// untouched in release builds.
    pub fn create_resource<T: CreateFromDescriptor>(
        &self,
        id: &str,
        descriptor: T::Descriptor,
        description: &str,
    ) -> TypedResourceHandle<T> {
        let resource = {
            let mut state = self.lock_state();
            match self.get_resource_locked(&mut state, T::resource_type(), id, true) {
                Some(resource) => resource,
                None => return TypedResourceHandle::invalid(),
            }
        };

        self.create_in_place::<T>(resource, descriptor, description)
    }

    /// Returns the resource `id` if it exists, otherwise creates it from
    /// `descriptor`. The descriptor is consumed at most once per resource.
    pub fn get_or_create_resource<T: CreateFromDescriptor>(
        &self,
        id: &str,
        descriptor: T::Descriptor,
        description: &str,
    ) -> TypedResourceHandle<T> {
        let resource = {
            let mut state = self.lock_state();
            if let Some(existing) = self.get_resource_locked(&mut state, T::resource_type(), id, false) {
                return TypedResourceHandle::from_typeless_unchecked(ResourceHandle::new(existing));
            }
            match self.get_resource_locked(&mut state, T::resource_type(), id, true) {
                Some(resource) => {
                    if !self.begin_create_locked(&mut state, &resource, description) {
                        return TypedResourceHandle::invalid();
                    }
                    resource
                }
                None => return TypedResourceHandle::invalid(),
            }
        };

        self.run_create::<T>(resource, descriptor)
    }

    fn create_in_place<T: CreateFromDescriptor>(
        &self,
        resource: Arc<Resource>,
        descriptor: T::Descriptor,
        description: &str,
    ) -> TypedResourceHandle<T> {
        let claimed = {
            let mut state = self.lock_state();
            self.begin_create_locked(&mut state, &resource, description)
        };

        if !claimed {
            return TypedResourceHandle::from_typeless_unchecked(self.handle_for(&resource));
        }

        self.run_create::<T>(resource, descriptor)
    }

    /// Marks `resource` as being created by the calling thread. Other threads
    /// treat it as in flight until [`run_create`](Self::run_create) completes.
    fn begin_create_locked(&self, state: &mut ManagerState, resource: &Arc<Resource>, description: &str) -> bool {
        if resource.state() != ResourceState::Unloaded || resource.is_queued_for_loading() {
            let message = format!(
                "Resource '{}' of type '{}' has already been created or loaded.",
                resource.id(),
                resource.type_name()
            );
            debug_assert!(false, "{message}");
            log::error!("{message}");
            return false;
        }

        resource.add_flags(ResourceFlags::IS_CREATED_RESOURCE);
        resource.remove_flags(ResourceFlags::IS_RELOADABLE);
        if !description.is_empty() {
            resource.set_description(description);
        }

        resource.add_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);
        self.claim_locked(state, resource);
        true
    }

    fn run_create<T: CreateFromDescriptor>(
        &self,
        resource: Arc<Resource>,
        descriptor: T::Descriptor,
    ) -> TypedResourceHandle<T> {
        let handle = self.handle_for(&resource);

        let outcome = self.invoke_loader(&resource, |request: &LoadRequest| {
            T::create(descriptor, request)
        });
        self.finish_load(&resource, outcome);

        debug_assert!(
            resource.state() != ResourceState::Unloaded,
            "Creating resource '{}' left it unloaded",
            resource.id()
        );

        TypedResourceHandle::from_typeless_unchecked(handle)
    }

    /// Mints a handle for a resource the caller already keeps alive.
    fn handle_for(&self, resource: &Arc<Resource>) -> ResourceHandle {
        let _state = self.lock_state();
        ResourceHandle::new(Arc::clone(resource))
    }

    /// Redirects every lookup of `name` to the resource id `target_id`.
    pub fn register_named_resource(&self, name: &str, target_id: &str) {
        self.lock_state()
            .named_resources
            .insert(name.to_string(), target_id.to_string());
    }

    /// Removes a redirection set by [`register_named_resource`](Self::register_named_resource).
    pub fn unregister_named_resource(&self, name: &str) {
        self.lock_state().named_resources.remove(name);
    }

    /// Generates an id of the form `{prefix}-{n}` that no resource uses yet.
    pub fn generate_unique_resource_id(&self, prefix: &str) -> String {
        let mut state = self.lock_state();
        loop {
            let candidate = format!("{prefix}-{}", state.next_unique_id);
            state.next_unique_id += 1;

            let hash = hash_resource_id(&candidate);
            let taken = state
                .tables
                .values()
                .any(|table| table.get(&candidate, hash).is_some());
            if !taken {
                return candidate;
            }
        }
    }

    /// Handles to every resource of type `T` or of a type deriving from it.
    pub fn all_resources_of_type<T: ResourceKind>(&self) -> Vec<TypedResourceHandle<T>> {
        let base = T::resource_type();
        let state = self.lock_state();
        state
            .tables
            .iter()
            .filter(|(ty, _)| self.registry().is_derived_from(**ty, base))
            .flat_map(|(_, table)| table.iter())
            .map(|resource| TypedResourceHandle::from_typeless_unchecked(ResourceHandle::new(Arc::clone(resource))))
            .collect()
    }

    /// Number of resource records currently alive, across all types.
    pub fn resource_count(&self) -> usize {
        self.lock_state().all_resources().count()
    }
}
