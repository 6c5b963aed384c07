// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod engine_event;

pub use engine_event::{EngineEvent, EngineObserver, EventBroadcaster};
