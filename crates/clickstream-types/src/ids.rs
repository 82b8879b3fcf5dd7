//! Type-safe identifier wrapper around [`Uuid`].
//!
//! Simulated visitors get a [`UserId`] the moment they are admitted. IDs are
//! drawn from the owning worker's random source rather than the OS so that a
//! seeded run reproduces the same identities.

use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};
use uuid::{Builder, Uuid};

/// Unique identifier for a simulated visitor.
///
/// Displayed and serialized as 32 lowercase hex digits without hyphens.
/// Deserialization accepts any textual UUID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random (version 4) identifier from the given source.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 16];
        rng.fill(&mut bytes);
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.simple())
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<UserId> for Uuid {
    fn from(id: UserId) -> Self {
        id.0
    }
}
