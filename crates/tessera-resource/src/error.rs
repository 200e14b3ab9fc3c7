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

//! Errors returned by the non-hot-path resource APIs.
//!
//! Acquisition never returns these; it reports its outcome through
//! [`AcquireResult`](crate::AcquireResult) instead.

use std::path::PathBuf;
use thiserror::Error;

/// An error raised while configuring the manager or resolving handles.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The configuration text is not valid RON for [`ResourceManagerConfig`](crate::ResourceManagerConfig).
    #[error("invalid resource manager configuration: {0}")]
    InvalidConfig(#[from] ron::error::SpannedError),

    /// The configuration could not be written out.
    #[error("failed to serialize resource manager configuration: {0}")]
    ConfigSerialization(#[from] ron::Error),

    /// A configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        /// The path that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No resource type is registered under this name.
    #[error("unknown resource type '{0}'")]
    UnknownType(String),

    /// A handle was converted to a type its resource does not derive from.
    #[error("resource '{resource_id}' of type '{actual}' is not a '{expected}'")]
    TypeMismatch {
        /// Id of the referenced resource.
        resource_id: String,
        /// The dynamic type of the resource.
        actual: String,
        /// The type the handle was converted to.
        expected: String,
    },

    /// The manager refused to create the resource (empty id, abstract type, shutdown).
    #[error("resource '{0}' could not be resolved")]
    Unresolved(String),
}
