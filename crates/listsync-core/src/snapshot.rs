//! Snapshots: the two sides of a reconciliation.
//!
//! A [`LocalSnapshot`] is the canonical view of a Location at the moment an
//! operation starts. A [`PlatformSnapshot`] is what a platform adapter
//! observed, already normalized into the same field vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::Platform;

/// A comparable listing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Address,
    Address2,
    City,
    State,
    PostalCode,
    Country,
    Phone,
    Website,
    Category,
}

impl Field {
    /// All fields, in a stable order.
    pub const ALL: [Field; 10] = [
        Field::Name,
        Field::Address,
        Field::Address2,
        Field::City,
        Field::State,
        Field::PostalCode,
        Field::Country,
        Field::Phone,
        Field::Website,
        Field::Category,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Address => "address",
            Field::Address2 => "address2",
            Field::City => "city",
            Field::State => "state",
            Field::PostalCode => "postal_code",
            Field::Country => "country",
            Field::Phone => "phone",
            Field::Website => "website",
            Field::Category => "category",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CoreError::UnknownField(s.to_string()))
    }
}

/// Values for every comparable field. Absent values read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FieldValues {
    /// The value of `field`, or `""` when absent.
    pub fn get(&self, field: Field) -> &str {
        self.slot(field).as_deref().unwrap_or("")
    }

    /// Set `field`. Empty strings are stored as `None`.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        *self.slot_mut(field) = if value.is_empty() { None } else { Some(value) };
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Name => &self.name,
            Field::Address => &self.address,
            Field::Address2 => &self.address2,
            Field::City => &self.city,
            Field::State => &self.state,
            Field::PostalCode => &self.postal_code,
            Field::Country => &self.country,
            Field::Phone => &self.phone,
            Field::Website => &self.website,
            Field::Category => &self.category,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::Address => &mut self.address,
            Field::Address2 => &mut self.address2,
            Field::City => &mut self.city,
            Field::State => &mut self.state,
            Field::PostalCode => &mut self.postal_code,
            Field::Country => &mut self.country,
            Field::Phone => &mut self.phone,
            Field::Website => &mut self.website,
            Field::Category => &mut self.category,
        }
    }
}

/// Canonical Location fields captured for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    pub fields: FieldValues,
}

impl LocalSnapshot {
    pub fn new(fields: FieldValues) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: Field) -> &str {
        self.fields.get(field)
    }
}

/// What a platform reported for one listing, normalized by its adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub platform: Platform,
    pub external_id: String,
    pub fields: FieldValues,
    /// Platform-only display data (follower counts, ratings, …).
    /// Never compared and never pushed.
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl PlatformSnapshot {
    pub fn new(platform: Platform, external_id: impl Into<String>, fields: FieldValues) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
            fields,
            extras: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        self.fields.get(field)
    }

    /// Content hash over the comparable fields, hex encoded.
    ///
    /// Extras are excluded so display-only churn does not read as drift.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"listsync-snapshot-v0:");
        hasher.update(self.platform.as_str().as_bytes());
        hash_str(&mut hasher, &self.external_id);
        for field in Field::ALL {
            hash_str(&mut hasher, self.fields.get(field).trim());
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
