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

use common::{DecalTexture, Material, Texture, Texture2D};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tessera_resource::{
    AcquireMode, AcquireResult, CreateFromDescriptor, LoadError, LoadRequest, Resource, ResourceEvent,
    ResourceError, ResourceFlags, ResourceKind, ResourceLoadDesc, ResourceManagerConfig, ResourceState,
    TypedResourceHandle,
};

#[test]
fn load_resource_is_lazy_and_deduplicated() {
    // --- 1. ARRANGE ---
    let manager = common::texture_manager();

    // --- 2. ACT ---
    let first = manager.load_resource::<Texture2D>("tex:brick.png");
    let second = manager.load_resource::<Texture2D>("tex:brick.png");

    // --- 3. ASSERT ---
    assert_eq!(first, second);
    assert_eq!(first.state(), Some(ResourceState::Unloaded));
    assert_eq!(first.ref_count(), 2);
    assert_eq!(manager.resource_count(), 1);
    assert!(!manager.is_any_loading_in_progress());
}

#[test]
fn concurrent_lookups_yield_one_resource() {
    let manager = common::texture_manager();

    let handles: Vec<TypedResourceHandle<Texture2D>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| manager.load_resource::<Texture2D>("tex:shared.png")))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("lookup thread panicked"))
            .collect()
    });

    assert!(handles.iter().all(|handle| *handle == handles[0]));
    assert_eq!(handles[0].ref_count(), 8);
    assert_eq!(manager.resource_count(), 1);

    drop(handles);
    assert_eq!(manager.free_all_unused_resources(), 1);
}

#[test]
fn invalid_ids_and_abstract_types_give_invalid_handles() {
    let manager = common::texture_manager();

    assert!(!manager.load_resource::<Texture2D>("").is_valid());
    assert!(!manager.load_resource::<Texture>("tex:abstract").is_valid());
    assert_eq!(manager.resource_count(), 0);
}

#[test]
fn get_existing_resource_never_creates() {
    let manager = common::texture_manager();

    assert!(!manager.get_existing_resource::<Texture2D>("tex:a").is_valid());

    let loaded = manager.load_resource::<Texture2D>("tex:a");
    let existing = manager.get_existing_resource::<Texture2D>("tex:a");

    assert_eq!(loaded, existing);
    assert_eq!(manager.resource_count(), 1);
}

#[test]
fn named_resources_redirect_lookups() {
    let manager = common::texture_manager();
    manager.register_named_resource("default-albedo", "tex:white.png");

    let by_name = manager.load_resource::<Texture2D>("default-albedo");
    let by_id = manager.load_resource::<Texture2D>("tex:white.png");
    assert_eq!(by_name, by_id);
    assert_eq!(by_name.resource_id(), Some("tex:white.png"));

    manager.unregister_named_resource("default-albedo");
    let unnamed = manager.load_resource::<Texture2D>("default-albedo");
    assert_ne!(unnamed, by_id);
}

#[test]
fn generated_ids_skip_existing_resources() {
    let manager = common::texture_manager();
    let _taken = manager.load_resource::<Texture2D>("rt-0");

    let first = manager.generate_unique_resource_id("rt");
    let second = manager.generate_unique_resource_id("rt");

    assert_eq!(first, "rt-1");
    assert_eq!(second, "rt-2");
}

#[test]
fn created_resources_are_loaded_in_place() {
    let manager = common::synchronous_manager();

    let material = manager.create_resource::<Material>("mat:red", "red".to_string(), "a red material");

    assert_eq!(material.state(), Some(ResourceState::Loaded));
    let resource = material.resource().expect("valid handle");
    assert!(resource.flags().contains(ResourceFlags::IS_CREATED_RESOURCE));
    assert!(!resource.flags().contains(ResourceFlags::IS_RELOADABLE));
    assert_eq!(resource.description(), "a red material");

    let lock = manager.acquire(&material, AcquireMode::BlockTillLoaded);
    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    assert_eq!(lock.content().map(|m| m.base_color.clone()), Some("red".to_string()));
}

/// A material whose constructions are counted.
struct CountedMaterial;

impl ResourceKind for CountedMaterial {
    const TYPE_NAME: &'static str = "CountedMaterial";
}

impl CreateFromDescriptor for CountedMaterial {
    type Descriptor = Arc<AtomicUsize>;

    fn create(descriptor: Arc<AtomicUsize>, _request: &LoadRequest) -> Result<ResourceLoadDesc, LoadError> {
        descriptor.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        Ok(ResourceLoadDesc::new(CountedMaterial))
    }
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "has already been created or loaded")]
fn creating_a_resource_twice_panics_in_debug_builds() {
    let manager = common::synchronous_manager();
    let _first = manager.create_resource::<Material>("mat:red", "red".to_string(), "");

    let _second = manager.create_resource::<Material>("mat:red", "crimson".to_string(), "");
}

#[test]
#[cfg(not(debug_assertions))]
fn creating_a_resource_twice_keeps_the_first_content_in_release_builds() {
    let manager = common::synchronous_manager();
    let first = manager.create_resource::<Material>("mat:red", "red".to_string(), "");

    let second = manager.create_resource::<Material>("mat:red", "crimson".to_string(), "");

    assert_eq!(first, second);
    let lock = manager.acquire(&second, AcquireMode::BlockTillLoaded);
    assert_eq!(lock.content().map(|m| m.base_color.clone()), Some("red".to_string()));
}

#[test]
fn get_or_create_constructs_once() {
    let manager = common::synchronous_manager();
    let constructions = Arc::new(AtomicUsize::new(0));

    let handles: Vec<TypedResourceHandle<CountedMaterial>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let constructions = Arc::clone(&constructions);
                let manager = &manager;
                scope.spawn(move || manager.get_or_create_resource::<CountedMaterial>("mat:counted", constructions, ""))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("creation thread panicked"))
            .collect()
    });

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(handles.iter().all(|handle| *handle == handles[0]));

    let lock = manager.acquire(&handles[0], AcquireMode::BlockTillLoaded);
    assert_eq!(lock.acquire_result(), AcquireResult::Final);
}

#[test]
fn resources_of_a_type_include_derived_types() {
    let manager = common::texture_manager();
    let _plain = manager.load_resource::<Texture2D>("tex:plain");
    let _decal = manager.load_resource::<DecalTexture>("decal:blood");
    let _material = manager.load_resource::<Material>("mat:stone");

    assert_eq!(manager.all_resources_of_type::<Texture>().len(), 2);
    assert_eq!(manager.all_resources_of_type::<Texture2D>().len(), 2);
    assert_eq!(manager.all_resources_of_type::<DecalTexture>().len(), 1);
    assert_eq!(manager.all_resources_of_type::<Material>().len(), 1);
}

#[test]
fn override_types_redirect_creation() {
    // --- 1. ARRANGE ---
    let manager = common::texture_manager();
    manager.register_resource_override_type(DecalTexture::resource_type(), |id| id.starts_with("decal:"));

    // --- 2. ACT ---
    let decal = manager.load_resource::<Texture2D>("decal:scorch");
    let plain = manager.load_resource::<Texture2D>("tex:scorch");
    let same_decal = manager.load_resource::<DecalTexture>("decal:scorch");

    // --- 3. ASSERT ---
    assert_eq!(decal.resource_type(), Some(DecalTexture::resource_type()));
    assert_eq!(plain.resource_type(), Some(Texture2D::resource_type()));
    assert_eq!(decal.as_typeless(), same_decal.as_typeless());

    manager.unregister_resource_override_type(DecalTexture::resource_type());
    let after = manager.load_resource::<Texture2D>("decal:other");
    assert_eq!(after.resource_type(), Some(Texture2D::resource_type()));
}

#[test]
fn resources_created_before_an_override_stay_reachable() {
    let manager = common::texture_manager();
    let early = manager.load_resource::<Texture2D>("decal:early");
    manager.register_resource_override_type(DecalTexture::resource_type(), |id| id.starts_with("decal:"));

    let again = manager.load_resource::<Texture2D>("decal:early");
    let fresh = manager.load_resource::<Texture2D>("decal:fresh");

    assert_eq!(again.as_typeless(), early.as_typeless());
    assert_eq!(again.resource_type(), Some(Texture2D::resource_type()));
    assert_eq!(fresh.resource_type(), Some(DecalTexture::resource_type()));
    assert_eq!(manager.resource_count(), 2);
}

#[test]
fn events_follow_the_resource_lifecycle() {
    let manager = common::texture_manager();
    let events = manager.subscribe();

    let handle = manager.load_resource::<Texture2D>("tex:events.png");
    let lock = manager.acquire(&handle, AcquireMode::BlockTillLoaded);
    assert_eq!(lock.acquire_result(), AcquireResult::Final);
    drop(lock);
    drop(handle);
    assert_eq!(manager.free_all_unused_resources(), 1);

    let received: Vec<ResourceEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 4, "unexpected events: {received:?}");
    assert!(matches!(received[0], ResourceEvent::Created(_)));
    assert!(matches!(received[1], ResourceEvent::ContentLoaded(_)));
    assert!(matches!(received[2], ResourceEvent::ContentUnloading(_)));
    assert!(matches!(received[3], ResourceEvent::Deleted(_)));
    assert!(received.iter().all(|event| event.resource_id() == Some("tex:events.png")));
}

#[test]
fn exists_events_are_broadcast_for_every_resource() {
    let manager = common::texture_manager();
    let _a = manager.load_resource::<Texture2D>("tex:a");
    let _b = manager.load_resource::<Material>("mat:b");
    let events = manager.subscribe();

    manager.broadcast_exists_event();

    let exists = events
        .try_iter()
        .filter(|event| matches!(event, ResourceEvent::Exists(_)))
        .count();
    assert_eq!(exists, 2);
}

#[test]
fn background_workers_drain_the_preload_queue() {
    let manager = common::manager_with(ResourceManagerConfig {
        worker_threads: 2,
        ..ResourceManagerConfig::default()
    });
    manager.set_loader_for::<Texture2D>(common::texture_loader());

    let handles: Vec<_> = (0..6)
        .map(|i| manager.load_resource::<Texture2D>(&format!("tex:streamed-{i}.png")))
        .collect();
    for handle in &handles {
        manager.preload_resource(handle);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.is_any_loading_in_progress() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert!(handles
        .iter()
        .all(|handle| handle.state() == Some(ResourceState::Loaded)));
    manager.shutdown();
}

#[test]
fn shutdown_frees_everything_unreferenced() {
    let manager = common::texture_manager();
    let events = manager.subscribe();

    let fallback = manager.load_resource::<Texture2D>("tex:placeholder.png");
    manager.set_type_loading_fallback(Texture2D::resource_type(), fallback.into_typeless());
    let kept = manager.load_resource::<Texture2D>("tex:kept.png");
    let _ = manager.load_resource::<Texture2D>("tex:dropped.png");

    manager.shutdown();

    assert!(manager.is_shut_down());
    assert_eq!(manager.resource_count(), 1);
    assert!(kept.is_valid());
    let received: Vec<ResourceEvent> = events.try_iter().collect();
    assert!(received.contains(&ResourceEvent::ManagerShuttingDown));

    // Nothing is queued once the manager is shut down.
    manager.preload_resource(&kept);
    assert!(!manager.is_any_loading_in_progress());

    // A second shutdown is a no-op.
    manager.shutdown();
    assert_eq!(events.try_iter().count(), 0);
}

#[test]
fn listeners_see_the_content_before_it_is_unloaded() {
    // --- 1. ARRANGE ---
    let manager = common::texture_manager();
    let handle = manager.load_resource::<Texture2D>("tex:hot.png");
    let _ = manager.acquire(&handle, AcquireMode::BlockTillLoaded);

    let content_seen = Arc::new(Mutex::new(Vec::new()));
    let listener = {
        let content_seen = Arc::clone(&content_seen);
        let watched = handle.clone();
        manager
            .add_resource_event_listener(
                &handle,
                Arc::new(move |event: &ResourceEvent| {
                    if matches!(event, ResourceEvent::ContentUnloading(_)) {
                        let has_content = watched.resource().is_some_and(Resource::has_content);
                        content_seen.lock().unwrap().push(has_content);
                    }
                }),
            )
            .expect("valid handle")
    };

    // --- 2. ACT ---
    assert!(manager.reload_resource(&handle, true));

    // --- 3. ASSERT ---
    assert_eq!(*content_seen.lock().unwrap(), [true]);
    assert!(!handle.resource().is_some_and(Resource::has_content));

    assert!(manager.remove_event_listener(listener));
    assert!(!manager.remove_event_listener(listener));
}

#[test]
fn listeners_run_synchronously_during_unused_resource_freeing() {
    let manager = common::texture_manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        manager.add_event_listener(Arc::new(move |event: &ResourceEvent| match event {
            ResourceEvent::ContentUnloading(info) => seen.lock().unwrap().push(format!("unloading:{:?}", info.state)),
            ResourceEvent::Deleted(info) => seen.lock().unwrap().push(format!("deleted:{}", info.resource_id)),
            _ => {}
        }));
    }

    let handle = manager.load_resource::<Texture2D>("tex:gc.png");
    let _ = manager.acquire(&handle, AcquireMode::BlockTillLoaded);
    drop(handle);
    assert_eq!(manager.free_all_unused_resources(), 1);

    assert_eq!(*seen.lock().unwrap(), ["unloading:Loaded", "deleted:tex:gc.png"]);
}

#[test]
fn resource_listeners_only_hear_their_resource_and_end_with_it() {
    let manager = common::texture_manager();
    let watched = manager.load_resource::<Texture2D>("tex:watched.png");
    let other = manager.load_resource::<Texture2D>("tex:other.png");
    let token = Arc::new(());
    let heard = Arc::new(AtomicUsize::new(0));
    {
        let token = Arc::clone(&token);
        let heard = Arc::clone(&heard);
        manager.add_resource_event_listener(
            &watched,
            Arc::new(move |_: &ResourceEvent| {
                let _token = &token;
                heard.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let _ = manager.acquire(&other, AcquireMode::BlockTillLoaded);
    assert_eq!(heard.load(Ordering::SeqCst), 0);

    let _ = manager.acquire(&watched, AcquireMode::BlockTillLoaded);
    assert_eq!(heard.load(Ordering::SeqCst), 1);

    drop(watched);
    manager.free_all_unused_resources();

    // ContentUnloading and Deleted, after which the listener is dropped.
    assert_eq!(heard.load(Ordering::SeqCst), 3);
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn cleanup_callbacks_release_handles_before_the_shutdown_sweep() {
    // --- 1. ARRANGE ---
    let manager = common::texture_manager();
    let cached = Arc::new(Mutex::new(Some(manager.load_resource::<Texture2D>("tex:cached.png"))));
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let cached = Arc::clone(&cached);
        let runs = Arc::clone(&runs);
        manager.add_resource_cleanup_callback(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            cached.lock().unwrap().take();
        });
    }
    let cleared = manager.add_resource_cleanup_callback(|| panic!("cleared callbacks never run"));
    assert!(manager.clear_resource_cleanup_callback(cleared));
    assert!(!manager.clear_resource_cleanup_callback(cleared));

    // --- 2. ACT ---
    manager.shutdown();
    manager.execute_all_resource_cleanup_callbacks();

    // --- 3. ASSERT ---
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(cached.lock().unwrap().is_none());
    assert_eq!(manager.resource_count(), 0);
}

#[test]
fn type_names_resolve_through_the_registry() {
    let manager = common::texture_manager();

    let handle = manager
        .load_resource_by_type_name("Texture2D", "tex:by-name.png")
        .expect("registered type");
    let typed = manager.load_resource::<Texture2D>("tex:by-name.png");
    assert_eq!(&handle, typed.as_typeless());

    assert!(matches!(
        manager.load_resource_by_type_name("Sound", "sfx:boom.wav"),
        Err(ResourceError::UnknownType(name)) if name == "Sound"
    ));
    assert!(matches!(
        manager.load_resource_by_type_name("Texture", "tex:abstract.png"),
        Err(ResourceError::Unresolved(_))
    ));
}
