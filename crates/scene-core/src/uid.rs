//! Stable 128-bit entity identifiers.
//!
//! A [`Uid`] is attached to an entity as a component the first time
//! something needs to refer to that entity persistently. Once attached it
//! never changes; the UID registry traps any attempt to overwrite it.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::{SerializeComponent, UiTypeInfo};
use crate::serializer::{SerializeContext, Serializer};

/// A globally unique, immutable-once-assigned entity identifier.
///
/// Serialized as a hyphenated UUID string. [`Uid::NULL`] (the nil UUID)
/// means "no entity".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Uuid);

impl Uid {
    pub const NULL: Uid = Uid(Uuid::nil());

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl SerializeComponent for Uid {
    fn serialize(&mut self, _cx: &mut SerializeContext<'_>, serializer: &mut Serializer) -> bool {
        // A stored identity is never null.
        serializer.serialize("uid", self) && !self.is_null()
    }
}

impl UiTypeInfo for Uid {
    fn ui_type_info() -> &'static str {
        "Stable identity used by saved scenes and entity references. Assigned on demand; read-only."
    }
}

// ---------------------------------------------------------------------------
// UidGenerator
// ---------------------------------------------------------------------------

/// Source of fresh UIDs.
#[derive(Debug)]
pub enum UidGenerator {
    /// Random version-4 UUIDs from the OS generator.
    Random,
    /// Version-4-shaped UUIDs from a seeded PCG stream; reproducible.
    Seeded(Box<Pcg64>),
}

impl UidGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self::Seeded(Box::new(Pcg64::seed_from_u64(seed)))
    }

    /// Produce a fresh, non-null UID.
    pub fn next_uid(&mut self) -> Uid {
        loop {
            let uuid = match self {
                Self::Random => Uuid::new_v4(),
                Self::Seeded(rng) => uuid::Builder::from_random_bytes(rng.gen()).into_uuid(),
            };
            if !uuid.is_nil() {
                return Uid(uuid);
            }
        }
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::Random
    }
}
