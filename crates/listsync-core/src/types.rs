//! Strong type definitions for listing reconciliation.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Location,
//! credential and workspace ids are owned by external collaborators and are
//! therefore opaque strings. Listing ids are derived by this crate.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an id issued by the owning collaborator.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a Location (canonical business profile).
    LocationId
);
opaque_id!(
    /// Identifier of a platform Credential.
    CredentialId
);
opaque_id!(
    /// Identifier of the workspace that owns locations and credentials.
    WorkspaceId
);

/// Third-party platforms a Location can be mirrored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Google,
    Bing,
    Apple,
    Yelp,
}

impl Platform {
    /// Every supported platform, in a stable order.
    pub const ALL: [Platform; 5] = [
        Platform::Facebook,
        Platform::Google,
        Platform::Bing,
        Platform::Apple,
        Platform::Yelp,
    ];

    /// Lowercase wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Google => "google",
            Platform::Bing => "bing",
            Platform::Apple => "apple",
            Platform::Yelp => "yelp",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownPlatform(s.to_string()))
    }
}

/// A 32-byte listing identifier.
///
/// Derived from Blake3(location_id || platform || credential_id), so two
/// listings for the same triple always share an id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingId(pub [u8; 32]);

impl ListingId {
    /// Derive the id of the listing for `(location, platform, credential)`.
    pub fn derive(location: &LocationId, platform: Platform, credential: &CredentialId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"listsync-listing-v0:");
        hasher.update(location.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(platform.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(credential.as_str().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListingId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ListingId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ListingId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ListingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
