//! Proptest generators for property-based testing.

use proptest::prelude::*;

use listsync_core::{
    Credential, Discrepancy, DiscrepancySet, Field, FieldValues, Listing, ListingStatus,
    Location, Platform,
};

/// Generate a Platform.
pub fn platform() -> impl Strategy<Value = Platform> {
    prop::sample::select(Platform::ALL.to_vec())
}

/// Generate a ListingStatus.
pub fn status() -> impl Strategy<Value = ListingStatus> {
    prop::sample::select(ListingStatus::ALL.to_vec())
}

/// Generate a Field.
pub fn field() -> impl Strategy<Value = Field> {
    prop::sample::select(Field::ALL.to_vec())
}

/// Generate a short field value, possibly empty.
pub fn field_value() -> impl Strategy<Value = String> {
    "[ A-Za-z0-9]{0,12}".prop_map(String::from)
}

/// Generate field values with some fields absent.
pub fn field_values() -> impl Strategy<Value = FieldValues> {
    prop::collection::vec(prop::option::of(field_value()), Field::ALL.len()).prop_map(|vals| {
        let mut values = FieldValues::default();
        for (field, value) in Field::ALL.into_iter().zip(vals) {
            if let Some(v) = value {
                values.set(field, v);
            }
        }
        values
    })
}

/// Generate a discrepancy set over random fields.
pub fn discrepancies() -> impl Strategy<Value = DiscrepancySet> {
    prop::collection::btree_map(field(), (field_value(), field_value()), 0..4).prop_map(|m| {
        m.into_iter()
            .map(|(f, (local, platform))| (f, Discrepancy { local, platform }))
            .collect()
    })
}

/// Generate a location that passes validation.
pub fn valid_location() -> impl Strategy<Value = Location> {
    (
        "[a-z0-9]{1,8}",
        "[A-Z][a-z]{2,20}( [A-Z][a-z]{2,12})?",
        prop::option::of("[0-9]{3} [0-9]{3} [0-9]{4}"),
        prop::option::of("[a-z]{3,12}\\.example"),
    )
        .prop_map(|(id, name, phone, host)| {
            let mut location = Location::new(format!("loc-{}", id), "ws-prop", name, 0);
            location.phone = phone.unwrap_or_default();
            location.website = host.map(|h| format!("https://{}", h)).unwrap_or_default();
            location
        })
}

/// Parameters for generating a listing.
#[derive(Debug, Clone)]
pub struct ListingParams {
    pub location: String,
    pub credential: String,
    pub platform: Platform,
    pub status: ListingStatus,
    pub discrepancies: DiscrepancySet,
    pub last_synced_at: Option<i64>,
}

impl Arbitrary for ListingParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            "[a-z]{1,4}",
            "[a-z]{1,4}",
            platform(),
            status(),
            discrepancies(),
            prop::option::of(0i64..=1_000_000i64),
        )
            .prop_map(
                |(location, credential, platform, status, discrepancies, last_synced_at)| {
                    ListingParams {
                        location,
                        credential,
                        platform,
                        status,
                        discrepancies,
                        last_synced_at,
                    }
                },
            )
            .boxed()
    }
}

/// Build a listing from parameters, bypassing the state machine.
pub fn listing_from_params(params: &ListingParams) -> Listing {
    let location = Location::new(params.location.as_str(), "ws-prop", "Cafe", 0);
    let credential = Credential::new(
        params.credential.as_str(),
        "ws-prop",
        params.platform,
        "acct",
        "token",
    );
    let mut listing = Listing::linked(&location, &credential, "ext", 0);
    listing.status = params.status;
    listing.discrepancies = params.discrepancies.clone();
    listing.last_synced_at = params.last_synced_at;
    listing
}
