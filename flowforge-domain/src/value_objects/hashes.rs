// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Hash Value Objects
//!
//! Every content-addressed identity in the engine - a value's hash, a
//! schema's hash, a manifest's hash, an inputs digest, a job's hash, a
//! pipeline structure's hash - is a [`crate::hashing::Multihash`] underneath.
//! They are kept as distinct newtypes so a `ValueHash` can never be passed
//! where a `JobHash` is expected, even though both are 33 identical bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::hashing::Multihash;

macro_rules! content_hash {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(Multihash);

        impl $name {
            pub fn new(hash: Multihash) -> Self {
                Self(hash)
            }

            pub fn as_multihash(&self) -> Multihash {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Multihash> for $name {
            fn from(hash: Multihash) -> Self {
                Self(hash)
            }
        }
    };
}

content_hash!(ValueHash, "The hash of a value's canonical payload plus its schema hash.");
content_hash!(SchemaHash, "The hash of a value schema's canonical encoding.");
content_hash!(ManifestHash, "The hash of a manifest's module type and canonical module config.");
content_hash!(InputsHash, "The hash of a job's sorted field -> value-hash input map.");
content_hash!(JobHash, "The hash of a manifest hash paired with an inputs hash; a job's identity.");
content_hash!(PipelineHash, "The hash of a compiled pipeline structure's canonical encoding.");
