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

//! Monotonic timing helpers used for frame timestamps and time-boxed work.

use std::time::{Duration, Instant};

/// A monotonic stopwatch started at construction.
///
/// The resource manager uses one stopwatch as its process clock (all
/// "last acquired" timestamps are milliseconds since it started) and short-lived
/// ones to bound incremental work such as unused-resource sweeps.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    /// Creates a new Stopwatch that starts counting immediately.
    /// ## Returns
    /// A new instance of the Stopwatch struct.
    #[inline]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Returns the time elapsed since the stopwatch was started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the elapsed time in whole milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Returns the elapsed time in seconds as f64.
    #[inline]
    pub fn elapsed_secs_f64(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Returns `true` once at least `budget` has passed since the start.
    ///
    /// ## Arguments
    /// * `budget` - The time budget to compare against.
    #[inline]
    pub fn has_elapsed(&self, budget: Duration) -> bool {
        self.elapsed() >= budget
    }

    /// Restarts the stopwatch and returns the time measured before the restart.
    pub fn restart(&mut self) -> Duration {
        let now = Instant::now();
        let measured = now.duration_since(self.start_time);
        self.start_time = now;
        measured
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
