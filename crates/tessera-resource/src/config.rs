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

//! Runtime configuration of the [`ResourceManager`](crate::ResourceManager).
//!
//! The configuration is plain serde data. It is usually kept next to the other
//! engine settings as a RON document:
//!
//! ```ron
//! (
//!     worker_threads: 2,
//!     loads_per_frame: 4,
//!     auto_free_unused: Some((timeout_ms: 2, last_acquire_threshold_ms: 10000)),
//!     failure_policy: Log,
//! )
//! ```

use crate::error::ResourceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Resources acquired within this window are re-queued right after a reload.
const DEFAULT_RELOAD_RECENCY_WINDOW_MS: u64 = 30_000;
const DEFAULT_LOADS_PER_FRAME: usize = 4;
const DEFAULT_PRIORITY_UPDATES_PER_FRAME: usize = 50;

/// How a "missing, no fallback" acquisition is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Panic with a descriptive message. Default in builds with debug assertions.
    Panic,
    /// Log an error and return an empty acquisition. Default in release builds.
    Log,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FailurePolicy::Panic
        } else {
            FailurePolicy::Log
        }
    }
}

/// Parameters of the per-frame sweep that frees unreferenced resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFreeConfig {
    /// Time budget of one sweep, in milliseconds.
    pub timeout_ms: u64,
    /// Only resources not acquired for at least this long are freed.
    pub last_acquire_threshold_ms: u64,
}

impl AutoFreeConfig {
    /// Returns the sweep budget as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the acquisition age threshold as a [`Duration`].
    pub fn last_acquire_threshold(&self) -> Duration {
        Duration::from_millis(self.last_acquire_threshold_ms)
    }
}

/// Configuration of a [`ResourceManager`](crate::ResourceManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    /// Number of background loader threads. With `0`, queued loads only
    /// progress through `per_frame_update` and blocking acquisitions.
    pub worker_threads: usize,
    /// Queued loads processed by `per_frame_update` when there are no workers.
    pub loads_per_frame: usize,
    /// Per-frame unused-resource sweep, disabled when `None`.
    pub auto_free_unused: Option<AutoFreeConfig>,
    /// Reloaded resources acquired within this window are re-queued immediately.
    pub reload_recency_window_ms: u64,
    /// Queue entries whose loading priority is re-evaluated every frame.
    pub priority_updates_per_frame: usize,
    /// Reporting of acquisitions that end up missing without a fallback.
    pub failure_policy: FailurePolicy,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            loads_per_frame: DEFAULT_LOADS_PER_FRAME,
            auto_free_unused: None,
            reload_recency_window_ms: DEFAULT_RELOAD_RECENCY_WINDOW_MS,
            priority_updates_per_frame: DEFAULT_PRIORITY_UPDATES_PER_FRAME,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ResourceManagerConfig {
    /// Parses a configuration from RON text. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ResourceError> {
        Ok(ron::from_str(text)?)
    }

    /// Reads and parses a RON configuration file.
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Serializes the configuration as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, ResourceError> {
        let pretty_config = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty_config)?)
    }

    /// Returns the reload recency window as a [`Duration`].
    pub fn reload_recency_window(&self) -> Duration {
        Duration::from_millis(self.reload_recency_window_ms)
    }

    /// A configuration without background workers, which makes loading fully
    /// deterministic. Intended for tools and tests.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            worker_threads: 0,
            ..Self::default()
        }
    }
}
