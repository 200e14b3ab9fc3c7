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

//! Background loader threads.

use crate::manager::{ManagerShared, ResourceManager};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

/// How long an idle loader thread sleeps before checking the queue again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Messages sent to the loader threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerSignal {
    /// New work was queued.
    Wake,
    /// One thread should exit.
    Shutdown,
}

/// The loader threads of one manager.
pub(crate) struct LoaderPool {
    threads: Vec<thread::JoinHandle<()>>,
    signals: Sender<WorkerSignal>,
}

impl LoaderPool {
    /// Starts `count` loader threads. The threads only keep a weak reference
    /// to the manager, so they never keep it alive.
    pub(crate) fn spawn(
        count: usize,
        manager: Weak<ManagerShared>,
        signals: Sender<WorkerSignal>,
        receiver: Receiver<WorkerSignal>,
    ) -> Self {
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let manager = Weak::clone(&manager);
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("Resource Loader {index}"))
                .spawn(move || worker_loop(manager, receiver));

            match spawned {
                Ok(handle) => threads.push(handle),
                Err(err) => log::error!("Failed to spawn resource loader thread {index}: {err}"),
            }
        }

        Self { threads, signals }
    }

    /// Stops every thread and waits for the loads they are running.
    pub(crate) fn shutdown(self) {
        for _ in &self.threads {
            let _ = self.signals.send(WorkerSignal::Shutdown);
        }

        let current = thread::current().id();
        for handle in self.threads {
            // The last manager handle may be dropped by a loader thread.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("A resource loader thread panicked.");
            }
        }
    }
}

fn worker_loop(manager: Weak<ManagerShared>, receiver: Receiver<WorkerSignal>) {
    log::debug!("{} started.", thread::current().name().unwrap_or("Resource Loader"));

    loop {
        match receiver.recv_timeout(IDLE_POLL) {
            Ok(WorkerSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(WorkerSignal::Wake) | Err(RecvTimeoutError::Timeout) => {}
        }

        let Some(shared) = manager.upgrade() else {
            break;
        };
        let manager = ResourceManager::from_shared(shared);

        while let Some(resource) = manager.claim_next_queued() {
            manager.run_load(&resource);
        }
    }

    log::debug!("{} stopped.", thread::current().name().unwrap_or("Resource Loader"));
}
