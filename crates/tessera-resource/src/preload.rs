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

//! The queue of resources waiting for a loader.
//!
//! A resource is flagged [`IS_QUEUED_FOR_LOADING`](crate::ResourceFlags::IS_QUEUED_FOR_LOADING)
//! from the moment it is pushed until its load completes. A flagged resource
//! that is no longer in the queue is *in flight*: some thread is running its
//! loader right now.

use crate::resource::{Resource, ResourceFlags, ResourcePriority};
use std::collections::VecDeque;
use std::sync::Arc;

/// One pending load.
#[derive(Debug)]
pub struct PreloadEntry {
    resource: Arc<Resource>,
    urgent: bool,
    priority: f32,
}

impl PreloadEntry {
    /// The resource to load.
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Urgent entries were requested by a blocking acquisition.
    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    /// Loading priority at the last evaluation. Lower loads first.
    pub fn priority(&self) -> f32 {
        self.priority
    }
}

/// Ordered list of pending loads. Every resource appears at most once.
#[derive(Debug, Default)]
pub struct PreloadQueue {
    entries: VecDeque<PreloadEntry>,
    next_priority_update: usize,
}

impl PreloadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_priority_update: 0,
        }
    }

    /// Number of pending loads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `resource` is waiting in the queue.
    pub fn contains(&self, resource: &Arc<Resource>) -> bool {
        self.position(resource).is_some()
    }

    /// Enqueues `resource` and flags it as queued.
    ///
    /// Urgent entries go to the front and raise the resource to
    /// [`ResourcePriority::Critical`].
    pub fn push(&mut self, resource: Arc<Resource>, urgent: bool, now_ms: u64) {
        debug_assert!(
            !self.contains(&resource),
            "Resource '{}' is already in the preload queue",
            resource.id()
        );

        resource.add_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);

        if urgent {
            resource.set_priority(ResourcePriority::Critical);
            self.entries.push_front(PreloadEntry {
                resource,
                urgent,
                priority: 0.0,
            });
        } else {
            let priority = resource.loading_priority(now_ms);
            self.entries.push_back(PreloadEntry {
                resource,
                urgent,
                priority,
            });
        }
    }

    /// Removes `resource` from the queue. Its queued flag is left untouched.
    ///
    /// ## Returns
    /// `false` if the resource was not waiting in the queue.
    pub fn remove(&mut self, resource: &Arc<Resource>) -> bool {
        match self.position(resource) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Takes the next resource to load. It stays flagged as queued.
    pub fn pop_front(&mut self) -> Option<Arc<Resource>> {
        self.entries.pop_front().map(|entry| entry.resource)
    }

    /// Removes every entry and clears their queued flags.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry
                .resource
                .remove_flags(ResourceFlags::IS_QUEUED_FOR_LOADING);
        }
        self.next_priority_update = 0;
    }

    /// Iterates over the pending entries, front first.
    pub fn iter(&self) -> impl Iterator<Item = &PreloadEntry> {
        self.entries.iter()
    }

    /// Re-evaluates the priority of up to `max_updates` entries, continuing
    /// where the previous call stopped, then runs one reverse bubble sort pass.
    ///
    /// One pass moves the most important entry to the front and every other
    /// entry one step closer to its place, which keeps the per-frame cost
    /// bounded while the order converges over a few frames.
    pub fn update_priorities(&mut self, now_ms: u64, max_updates: usize) {
        let count = self.entries.len();
        if count == 0 {
            return;
        }

        if self.next_priority_update >= count {
            self.next_priority_update = 0;
        }

        let end = (self.next_priority_update + max_updates).min(count);
        for entry in self.entries.range_mut(self.next_priority_update..end) {
            if !entry.urgent {
                entry.priority = entry.resource.loading_priority(now_ms);
            }
        }
        self.next_priority_update = end;

        self.reverse_bubble_sort_step();
    }

    fn reverse_bubble_sort_step(&mut self) {
        for i in (1..self.entries.len()).rev() {
            if self.entries[i - 1].priority > self.entries[i].priority {
                self.entries.swap(i - 1, i);
            }
        }
    }

    fn position(&self, resource: &Arc<Resource>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.resource, resource))
    }
}
