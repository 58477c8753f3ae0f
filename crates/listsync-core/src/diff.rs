//! Diff engine: field-level divergence between local and platform data.
//!
//! Comparison rules:
//! - The compared field list is fixed per platform and versioned by
//!   [`DIFF_FIELDS_VERSION`].
//! - Absent values count as `""`, so empty-vs-populated is a discrepancy.
//! - Values are compared exactly after trimming surrounding whitespace.
//!   Formatting differences ("(555) 0100" vs "555-0100") are reported.
//!
//! [`diff`] is a pure function.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::snapshot::{Field, LocalSnapshot, PlatformSnapshot};
use crate::types::Platform;

/// Version of the compared-field tables below.
pub const DIFF_FIELDS_VERSION: u32 = 1;

const BASE_FIELDS: &[Field] = &[
    Field::Name,
    Field::Address,
    Field::Address2,
    Field::City,
    Field::State,
    Field::PostalCode,
    Field::Country,
    Field::Phone,
    Field::Website,
];

const BASE_WITH_CATEGORY: &[Field] = &[
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

/// Fields compared for listings on `platform`.
pub fn compared_fields(platform: Platform) -> &'static [Field] {
    match platform {
        Platform::Facebook | Platform::Google => BASE_WITH_CATEGORY,
        Platform::Bing | Platform::Apple | Platform::Yelp => BASE_FIELDS,
    }
}

/// One divergent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub local: String,
    pub platform: String,
}

/// Discrepancies of one listing, keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscrepancySet(BTreeMap<Field, Discrepancy>);

impl DiscrepancySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: Field) -> Option<&Discrepancy> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn insert(&mut self, field: Field, discrepancy: Discrepancy) {
        self.0.insert(field, discrepancy);
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &Discrepancy)> {
        self.0.iter().map(|(f, d)| (*f, d))
    }
}

impl FromIterator<(Field, Discrepancy)> for DiscrepancySet {
    fn from_iter<I: IntoIterator<Item = (Field, Discrepancy)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compute the discrepancy set between `local` and `platform`.
pub fn diff(local: &LocalSnapshot, platform: &PlatformSnapshot) -> DiscrepancySet {
    compared_fields(platform.platform)
        .iter()
        .filter_map(|&field| {
            let ours = local.get(field).trim();
            let theirs = platform.get(field).trim();
            (ours != theirs).then(|| {
                (
                    field,
                    Discrepancy {
                        local: ours.to_string(),
                        platform: theirs.to_string(),
                    },
                )
            })
        })
        .collect()
}
