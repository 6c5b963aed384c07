// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod module_contract;
pub mod operation_registry;
pub mod value_registry;

pub use module_contract::{Module, ModuleResolver, SchemaMap, ValueMap};
pub use operation_registry::{ManifestTemplate, OperationRegistry};
pub use value_registry::{ValueReference, ValueRegistry};
