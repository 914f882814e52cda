//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use core_kernel::{BillId, Currency, LineItemId, Money};
use domain_billing::LineItem;
use fake::faker::lorem::en::Words;
use fake::Fake;
use proptest::prelude::*;

/// Strategy for generating supported Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::USD), Just(Currency::GEL)]
}

/// Strategy for generating valid line item amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000i64
}

/// Strategy for generating amounts a boundary must reject
pub fn non_positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    -1_000_000i64..=0i64
}

/// Strategy for generating positive Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for generating timestamps within one day of a fixed epoch
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..86_400i64).prop_map(|secs| {
        Utc.with_ymd_and_hms(2024, 10, 19, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + Duration::seconds(secs)
    })
}

/// Strategy for generating up to `max` stored line items for one bill
///
/// Timestamps may collide, which exercises id tie-breaking.
pub fn line_items_strategy(bill_id: BillId, max: usize) -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(
        (positive_amount_minor_strategy(), timestamp_strategy()),
        0..max,
    )
    .prop_map(move |entries| {
        entries
            .into_iter()
            .map(|(amount_minor, created_at)| LineItem {
                id: LineItemId::new_v7(),
                bill_id,
                description: random_description(),
                amount_minor,
                created_at,
            })
            .collect()
    })
}

/// A short random description
pub fn random_description() -> String {
    let words: Vec<String> = Words(1..4).fake();
    words.join(" ")
}
