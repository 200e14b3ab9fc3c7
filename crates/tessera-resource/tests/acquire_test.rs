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

mod common;

use common::{Material, Texture, Texture2D};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tessera_resource::{
    loader_fn, AcquireMode, AcquireResult, FailurePolicy, LoadError, LoadRequest, ResourceKind, ResourceLoadDesc,
    ResourceManagerConfig, ResourceState,
};

#[test]
fn pointer_only_never_loads() {
    let manager = common::texture_manager();
    let handle = manager.load_resource::<Texture2D>("tex:brick.png");

    let lock = manager.acquire(&handle, AcquireMode::PointerOnly);

    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    assert!(lock.content().is_none());
    assert_eq!(handle.state(), Some(ResourceState::Unloaded));
    assert_eq!(manager.preload_queue_len(), 0);
}

#[test]
fn blocking_acquire_loads_on_the_calling_thread() {
    let manager = common::texture_manager();
    let handle = manager.load_resource::<Texture2D>("tex:brick.png");

    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoaded);

    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    assert_eq!(lock.resource_id(), Some("tex:brick.png"));
    let content = lock.content().expect("loaded content");
    assert_eq!(content.name, "tex:brick.png");
    assert_eq!(handle.state(), Some(ResourceState::Loaded));
}

#[test]
fn loading_fallbacks_are_tried_in_priority_order() {
    // --- 1. ARRANGE ---
    let manager = common::texture_manager();
    let specific = manager.load_resource::<Texture2D>("tex:specific-placeholder.png");
    let caller = manager.load_resource::<Texture2D>("tex:caller-placeholder.png");
    let type_wide = manager.load_resource::<Texture2D>("tex:type-placeholder.png");
    manager.set_type_loading_fallback(Texture2D::resource_type(), type_wide.clone().into_typeless());

    let with_own_fallback = manager.load_resource_with_fallback::<Texture2D>("tex:a.png", specific.clone());
    let without_own_fallback = manager.load_resource::<Texture2D>("tex:b.png");
    let type_only = manager.load_resource::<Texture2D>("tex:c.png");

    // --- 2. ACT ---
    let own = manager.acquire_with_fallback(&with_own_fallback, AcquireMode::AllowLoadingFallback, &caller);
    let from_caller = manager.acquire_with_fallback(&without_own_fallback, AcquireMode::AllowLoadingFallback, &caller);
    let from_type = manager.acquire(&type_only, AcquireMode::AllowLoadingFallback);

    // --- 3. ASSERT ---
    assert_eq!(own.acquire_result(), AcquireResult::LoadingFallback);
    assert_eq!(own.resource_id(), specific.resource_id());
    assert_eq!(from_caller.acquire_result(), AcquireResult::LoadingFallback);
    assert_eq!(from_caller.resource_id(), caller.resource_id());
    assert_eq!(from_type.acquire_result(), AcquireResult::LoadingFallback);
    assert_eq!(from_type.resource_id(), type_wide.resource_id());

    // Fallbacks are fully loaded; the requested resources wait in the queue.
    assert_eq!(specific.state(), Some(ResourceState::Loaded));
    assert_eq!(with_own_fallback.state(), Some(ResourceState::Unloaded));
    assert_eq!(manager.preload_queue_len(), 3);

    // Once loaded, the resource itself is returned.
    manager.process_preload_queue(usize::MAX);
    let loaded = manager.acquire(&type_only, AcquireMode::AllowLoadingFallback);
    assert_eq!(loaded.acquire_result(), AcquireResult::Final);
}

#[test]
fn loading_fallback_mode_blocks_without_fallbacks() {
    let manager = common::texture_manager();
    let handle = manager.load_resource::<Texture2D>("tex:no-fallback.png");

    let lock = manager.acquire(&handle, AcquireMode::AllowLoadingFallback);

    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    assert_eq!(handle.state(), Some(ResourceState::Loaded));
}

#[test]
fn type_fallbacks_are_inherited_from_base_types() {
    let manager = common::texture_manager();
    let placeholder = manager.load_resource::<Texture2D>("tex:base-placeholder.png");
    manager.set_type_loading_fallback(Texture::resource_type(), placeholder.clone().into_typeless());

    let handle = manager.load_resource::<Texture2D>("tex:derived.png");
    let lock = manager.acquire(&handle, AcquireMode::AllowLoadingFallbackNeverFail);

    assert_eq!(lock.acquire_result(), AcquireResult::LoadingFallback);
    assert_eq!(lock.resource_id(), placeholder.resource_id());
}

#[test]
fn missing_resources_use_the_missing_fallback() {
    let manager = common::texture_manager();
    let checkerboard = manager.load_resource::<Texture2D>("tex:checkerboard.png");
    manager.set_type_missing_fallback(Texture2D::resource_type(), checkerboard.clone().into_typeless());

    let handle = manager.load_resource::<Texture2D>("tex:missing.png");
    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoaded);

    assert_eq!(lock.acquire_result(), AcquireResult::MissingFallback);
    assert_eq!(lock.resource_id(), Some("tex:checkerboard.png"));
    assert_eq!(handle.state(), Some(ResourceState::LoadedResourceMissing));
    assert_eq!(
        lock.content().map(|texture| texture.name.clone()),
        Some("tex:checkerboard.png".to_string())
    );
}

#[test]
fn missing_resources_without_fallback_return_nothing() {
    let manager = common::texture_manager();
    let handle = manager.load_resource::<Texture2D>("tex:missing.png");

    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoadedNeverFail);

    assert_eq!(lock.acquire_result(), AcquireResult::None);
    assert!(!lock.is_valid());
    assert!(lock.content().is_none());
    assert_eq!(handle.state(), Some(ResourceState::LoadedResourceMissing));

    // The failure is only logged under the log policy.
    let logged = manager.acquire(&handle, AcquireMode::AllowLoadingFallback);
    assert_eq!(logged.acquire_result(), AcquireResult::None);
}

#[test]
#[should_panic(expected = "is missing")]
fn missing_resources_panic_under_the_panic_policy() {
    let manager = common::manager_with(ResourceManagerConfig {
        failure_policy: FailurePolicy::Panic,
        ..ResourceManagerConfig::synchronous()
    });
    manager.set_loader_for::<Texture2D>(common::texture_loader());
    let handle = manager.load_resource::<Texture2D>("tex:missing.png");

    let _ = manager.acquire(&handle, AcquireMode::AllowLoadingFallback);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "is itself missing")]
fn missing_missing_fallbacks_panic_in_debug_builds() {
    let manager = common::texture_manager();
    let broken = manager.load_resource::<Texture2D>("tex:missing-checkerboard.png");
    manager.set_type_missing_fallback(Texture2D::resource_type(), broken.into_typeless());
    let handle = manager.load_resource::<Texture2D>("tex:missing.png");

    let _ = manager.acquire(&handle, AcquireMode::BlockTillLoadedNeverFail);
}

#[test]
#[cfg(not(debug_assertions))]
fn missing_missing_fallbacks_yield_nothing_in_release_builds() {
    let manager = common::texture_manager();
    let broken = manager.load_resource::<Texture2D>("tex:missing-checkerboard.png");
    manager.set_type_missing_fallback(Texture2D::resource_type(), broken.clone().into_typeless());
    let handle = manager.load_resource::<Texture2D>("tex:missing.png");

    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoadedNeverFail);

    assert_eq!(lock.acquire_result(), AcquireResult::None);
    assert!(!lock.is_valid());
    assert_eq!(broken.state(), Some(ResourceState::LoadedResourceMissing));
}

#[test]
fn forced_no_fallback_frames_make_acquisitions_block() {
    let manager = common::texture_manager();
    let placeholder = manager.load_resource::<Texture2D>("tex:placeholder.png");
    manager.set_type_loading_fallback(Texture2D::resource_type(), placeholder.clone().into_typeless());

    manager.force_no_fallback_acquisition(1);
    let first = manager.load_resource::<Texture2D>("tex:first.png");
    let lock = manager.acquire(&first, AcquireMode::AllowLoadingFallback);
    assert_eq!(lock.acquire_result(), AcquireResult::Final);

    manager.per_frame_update();
    assert_eq!(manager.force_no_fallback_frames(), 0);

    let second = manager.load_resource::<Texture2D>("tex:second.png");
    let lock = manager.acquire(&second, AcquireMode::AllowLoadingFallback);
    assert_eq!(lock.acquire_result(), AcquireResult::LoadingFallback);
}

#[test]
fn quality_levels_stream_in_on_reacquisition() {
    // --- 1. ARRANGE ---
    let manager = common::synchronous_manager();
    manager.set_loader_for::<Texture2D>(loader_fn(|request: &LoadRequest| {
        let quality = request
            .current_content_as::<Texture2D>()
            .map_or(0, |previous| previous.quality + 1);
        Ok(ResourceLoadDesc::new(Texture2D {
            name: request.resource_id().to_string(),
            quality,
        })
        .with_quality_levels(quality, 2 - quality))
    }));
    let handle = manager.load_resource::<Texture2D>("tex:terrain.dds");

    // --- 2. ACT & ASSERT ---
    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoaded);
    assert_eq!(lock.content().map(|texture| texture.quality), Some(0));

    for expected_quality in 1..=2 {
        // Acquiring a loaded resource with loadable levels left queues the next one.
        let _ = manager.acquire(&handle, AcquireMode::AllowLoadingFallback);
        assert_eq!(manager.process_preload_queue(usize::MAX), 1);

        let lock = manager.acquire(&handle, AcquireMode::PointerOnly);
        assert_eq!(lock.content().map(|texture| texture.quality), Some(expected_quality));
    }

    let resource = handle.resource().expect("valid handle");
    assert_eq!(resource.quality_levels_loadable(), 0);
    assert_eq!(resource.quality_levels_discardable(), 2);
    assert_eq!(resource.change_counter(), 3);

    let _ = manager.acquire(&handle, AcquireMode::BlockTillLoaded);
    assert_eq!(manager.preload_queue_len(), 0);
}

#[test]
fn loaders_may_acquire_allowed_types() {
    let manager = common::texture_manager();
    manager.allow_resource_type_acquire_during_update_content(Material::resource_type(), Texture::resource_type());
    manager.set_loader_for::<Material>(loader_fn(|request: &LoadRequest| -> Result<ResourceLoadDesc, LoadError> {
        let albedo = request.manager().load_resource::<Texture2D>("tex:albedo.png");
        let texture = request
            .manager()
            .acquire(&albedo, AcquireMode::BlockTillLoaded)
            .content()
            .ok_or("albedo unavailable")?;
        Ok(ResourceLoadDesc::new(Material {
            base_color: texture.name.clone(),
        }))
    }));

    assert!(manager.is_resource_type_acquire_during_update_content_allowed(
        Material::resource_type(),
        Texture2D::resource_type()
    ));
    assert!(!manager.is_resource_type_acquire_during_update_content_allowed(
        Texture2D::resource_type(),
        Material::resource_type()
    ));

    let material = manager.load_resource::<Material>("mat:wall");
    let lock = manager.acquire(&material, AcquireMode::BlockTillLoaded);

    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    assert_eq!(
        lock.content().map(|material| material.base_color.clone()),
        Some("tex:albedo.png".to_string())
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "while constructing a 'Material' resource is not allowed")]
fn loaders_acquiring_disallowed_types_panic_in_debug_builds() {
    let manager = common::texture_manager();
    manager.set_loader_for::<Material>(loader_fn(|request: &LoadRequest| -> Result<ResourceLoadDesc, LoadError> {
        let albedo = request.manager().load_resource::<Texture2D>("tex:albedo.png");
        let _ = request.manager().acquire(&albedo, AcquireMode::BlockTillLoaded);
        Ok(ResourceLoadDesc::new(Material {
            base_color: "white".to_string(),
        }))
    }));
    let material = manager.load_resource::<Material>("mat:wall");

    let _ = manager.acquire(&material, AcquireMode::BlockTillLoadedNeverFail);
}

#[test]
fn panicking_loaders_leave_the_resource_missing() {
    let manager = common::texture_manager();
    manager.set_loader_for::<Material>(loader_fn(|_request: &LoadRequest| -> Result<ResourceLoadDesc, LoadError> {
        panic!("corrupt material header")
    }));
    let material = manager.load_resource::<Material>("mat:corrupt");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        manager
            .acquire(&material, AcquireMode::BlockTillLoadedNeverFail)
            .acquire_result()
    }));

    // Debug builds resume the panic once the load is settled.
    assert_eq!(outcome.is_err(), cfg!(debug_assertions));
    assert_eq!(material.state(), Some(ResourceState::LoadedResourceMissing));
    assert!(!manager.is_any_loading_in_progress());
    assert_eq!(
        manager
            .acquire(&material, AcquireMode::BlockTillLoadedNeverFail)
            .acquire_result(),
        AcquireResult::None
    );
}

#[test]
fn concurrent_pointer_only_sees_the_resource_being_loaded() {
    // --- 1. ARRANGE ---
    let manager = common::manager_with(ResourceManagerConfig {
        worker_threads: 1,
        failure_policy: FailurePolicy::Log,
        ..ResourceManagerConfig::default()
    });
    let (release, gate) = crossbeam_channel::bounded::<()>(1);
    manager.set_loader_for::<Texture2D>(loader_fn(move |request: &LoadRequest| -> Result<ResourceLoadDesc, LoadError> {
        gate.recv_timeout(Duration::from_secs(10))?;
        Ok(ResourceLoadDesc::new(Texture2D {
            name: request.resource_id().to_string(),
            quality: 0,
        }))
    }));
    let handle = manager.load_resource::<Texture2D>("tex:brick.png");

    // --- 2. ACT ---
    let blocking = {
        let manager = manager.clone();
        let handle = handle.clone();
        thread::spawn(move || {
            manager
                .acquire(&handle, AcquireMode::BlockTillLoaded)
                .acquire_result()
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.state() != Some(ResourceState::Loading) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    let peek = manager.acquire(&handle, AcquireMode::PointerOnly);

    // --- 3. ASSERT ---
    assert_eq!(peek.acquire_result(), AcquireResult::Final);
    assert_eq!(peek.as_acquired().handle(), handle.as_typeless());
    assert_eq!(peek.as_acquired().state(), Some(ResourceState::Loading));
    assert!(peek.content().is_none());

    release.send(()).expect("loader is waiting");
    assert_eq!(blocking.join().expect("acquiring thread panicked"), AcquireResult::Final);
    assert_eq!(handle.state(), Some(ResourceState::Loaded));

    manager.shutdown();
}
