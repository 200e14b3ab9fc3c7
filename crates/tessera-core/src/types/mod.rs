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

//! Stable resource type identity and the derivation oracle.
//!
//! A [`ResourceTypeId`] is derived from a type name, so it is identical across
//! runs and processes. The [`TypeRegistry`] trait is the only place where
//! "is-a" questions are answered; consumers never hard-code type hierarchies.

mod id;
mod registry;

pub use self::id::ResourceTypeId;
pub use self::registry::{ResourceTypeRegistry, TypeInfo, TypeRegistry};
