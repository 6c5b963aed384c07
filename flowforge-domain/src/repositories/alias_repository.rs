// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alias Repository Port
//!
//! An alias is a human-readable name pointing at a value id, scoped to an
//! alias archive (§3, GLOSSARY). Writing an alias that already exists
//! advances its history rather than overwriting it: `lookup_alias` always
//! answers from the current-state index (property 7, "alias
//! single-valuedness"), while `alias_history` exposes every prior binding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::value_objects::ValueId;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AliasHistoryEntry {
    pub value_id: ValueId,
    pub written_at: DateTime<Utc>,
}

#[async_trait]
pub trait AliasRepository: Send + Sync {
    async fn lookup_alias(&self, name: &str) -> Result<Option<ValueId>, EngineError>;
    async fn write_alias(&self, name: &str, value_id: ValueId) -> Result<(), EngineError>;
    async fn list_aliases(&self) -> Result<Vec<String>, EngineError>;
    async fn alias_history(&self, name: &str) -> Result<Vec<AliasHistoryEntry>, EngineError>;
}
