//! M-Pesa transaction charges
//!
//! Charges come from a versioned tariff: bands of `[min, max]` amounts per
//! category, each tagged with the date it takes effect. For a given date only
//! the bands of the most recent effective date not after it apply. Those bands
//! are sorted by their lower bound and binary searched, so pricing a batch of
//! thousands of items costs one table read per category.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::payments::types::ParseEnumError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChargeError {
    #[error("No M-Pesa charge found for Kshs. {} ({category}) as of {as_of}", kshs(.amount))]
    NoBand {
        amount: i64,
        category: ChargeCategory,
        as_of: NaiveDate,
    },

    #[error("Charge total for {category} payments exceeds the supported range")]
    Overflow { category: ChargeCategory },

    #[error("Charge table unavailable: {0}")]
    Table(String),
}

impl ChargeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChargeError::Table(_))
    }
}

fn kshs(amount: &i64) -> String {
    let sign = if *amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Who receives the money, which decides the tariff used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChargeCategory {
    Mobile,
    Business,
}

impl ChargeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeCategory::Mobile => "mobile",
            ChargeCategory::Business => "business",
        }
    }
}

impl fmt::Display for ChargeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeCategory {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mobile" => Ok(ChargeCategory::Mobile),
            "business" => Ok(ChargeCategory::Business),
            other => Err(ParseEnumError {
                kind: "charge category",
                value: other.to_string(),
            }),
        }
    }
}

/// One tariff row. Amounts are minor units; `max_amount = None` is unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeBand {
    pub category: ChargeCategory,
    pub min_amount: i64,
    pub max_amount: Option<i64>,
    pub charge: i64,
    pub effective_date: NaiveDate,
}

impl ChargeBand {
    pub fn contains(&self, amount: i64) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount <= max)
    }
}

/// Read access to the stored tariff.
#[async_trait]
pub trait ChargeTable: Send + Sync {
    /// Bands of `category` whose effective date is on or before `as_of`.
    async fn bands(
        &self,
        category: ChargeCategory,
        as_of: NaiveDate,
    ) -> Result<Vec<ChargeBand>, ChargeError>;
}

/// In-process tariff, mostly for tests and seeding.
#[derive(Debug, Default)]
pub struct MemoryChargeTable {
    bands: RwLock<Vec<ChargeBand>>,
}

impl MemoryChargeTable {
    pub fn new(bands: Vec<ChargeBand>) -> Self {
        Self {
            bands: RwLock::new(bands),
        }
    }

    /// The published Safaricom tariff, effective from `effective_date`.
    pub fn standard_tariff(effective_date: NaiveDate) -> Self {
        Self::new(standard_bands(effective_date))
    }

    pub async fn insert(&self, band: ChargeBand) {
        self.bands.write().await.push(band);
    }
}

#[async_trait]
impl ChargeTable for MemoryChargeTable {
    async fn bands(
        &self,
        category: ChargeCategory,
        as_of: NaiveDate,
    ) -> Result<Vec<ChargeBand>, ChargeError> {
        Ok(self
            .bands
            .read()
            .await
            .iter()
            .filter(|band| band.category == category && band.effective_date <= as_of)
            .cloned()
            .collect())
    }
}

const BUSINESS_TARIFF: &[(i64, Option<i64>, i64)] = &[
    (0, Some(4_900), 200),
    (5_000, Some(10_000), 300),
    (10_100, Some(50_000), 800),
    (50_100, Some(100_000), 1_300),
    (100_100, Some(150_000), 1_800),
    (150_100, Some(250_000), 2_500),
    (250_100, Some(350_000), 3_000),
    (350_100, Some(500_000), 3_900),
    (500_100, Some(750_000), 4_800),
    (750_100, Some(1_000_000), 5_400),
    (1_000_100, Some(1_500_000), 6_300),
    (1_500_100, Some(2_000_000), 6_800),
    (2_000_100, Some(2_500_000), 7_400),
    (2_500_100, Some(3_000_000), 7_900),
    (3_000_100, Some(3_500_000), 9_000),
    (3_500_100, Some(4_000_000), 10_600),
    (4_000_100, Some(4_500_000), 11_000),
    (4_500_100, Some(100_000_000), 11_500),
];

const MOBILE_TARIFF: &[(i64, Option<i64>, i64)] = &[
    (0, Some(10_000), 0),
    (10_100, Some(150_000), 500),
    (150_100, Some(500_000), 900),
    (500_100, Some(2_000_000), 1_100),
    (2_000_100, Some(25_000_000), 1_300),
];

fn standard_bands(effective_date: NaiveDate) -> Vec<ChargeBand> {
    let rows = move |category: ChargeCategory, table: &'static [(i64, Option<i64>, i64)]| {
        table
            .iter()
            .map(move |&(min_amount, max_amount, charge)| ChargeBand {
                category,
                min_amount,
                max_amount,
                charge,
                effective_date,
            })
    };

    rows(ChargeCategory::Business, BUSINESS_TARIFF)
        .chain(rows(ChargeCategory::Mobile, MOBILE_TARIFF))
        .collect()
}

/// A priced item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeQuote {
    pub amount: i64,
    pub category: ChargeCategory,
    pub charge: i64,
    pub band_min: i64,
    pub band_max: Option<i64>,
    pub effective_date: NaiveDate,
}

/// An item of a batch disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeItem {
    pub amount: i64,
    pub category: ChargeCategory,
}

/// Charges of a batch split by the account they are debited from. Mobile
/// payouts leave the utility account, business payments the working account.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkCharge {
    pub utility_charge: i64,
    pub working_charge: i64,
}

impl BulkCharge {
    /// Both accounts together. [`ChargeBandEngine::bulk_totals`] only returns
    /// totals whose sum fits.
    pub fn total(&self) -> i64 {
        self.utility_charge.saturating_add(self.working_charge)
    }
}

/// Bands in force on one date, sorted by lower bound.
#[derive(Debug)]
struct Schedule {
    category: ChargeCategory,
    as_of: NaiveDate,
    bands: Vec<ChargeBand>,
}

impl Schedule {
    fn build(category: ChargeCategory, as_of: NaiveDate, bands: Vec<ChargeBand>) -> Self {
        let latest = bands
            .iter()
            .filter(|band| band.effective_date <= as_of)
            .map(|band| band.effective_date)
            .max();

        let mut bands: Vec<ChargeBand> = match latest {
            Some(latest) => bands
                .into_iter()
                .filter(|band| band.effective_date == latest)
                .collect(),
            None => Vec::new(),
        };
        bands.sort_by_key(|band| band.min_amount);

        Self {
            category,
            as_of,
            bands,
        }
    }

    fn find(&self, amount: i64) -> Option<&ChargeBand> {
        let idx = self.bands.partition_point(|band| band.min_amount <= amount);
        if idx == 0 {
            return None;
        }
        let band = &self.bands[idx - 1];
        band.contains(amount).then_some(band)
    }

    fn quote(&self, amount: i64) -> Result<ChargeQuote, ChargeError> {
        let band = self.find(amount).ok_or(ChargeError::NoBand {
            amount,
            category: self.category,
            as_of: self.as_of,
        })?;

        Ok(ChargeQuote {
            amount,
            category: self.category,
            charge: band.charge,
            band_min: band.min_amount,
            band_max: band.max_amount,
            effective_date: band.effective_date,
        })
    }
}

/// Prices amounts against a [`ChargeTable`].
///
/// Every call reads the table afresh, so a newly written tariff applies from
/// its effective date without a restart. A batch reads each category once.
pub struct ChargeBandEngine {
    table: Arc<dyn ChargeTable>,
}

impl ChargeBandEngine {
    pub fn new(table: Arc<dyn ChargeTable>) -> Self {
        Self { table }
    }

    async fn schedule(
        &self,
        category: ChargeCategory,
        as_of: NaiveDate,
    ) -> Result<Schedule, ChargeError> {
        let bands = self.table.bands(category, as_of).await?;
        let schedule = Schedule::build(category, as_of, bands);
        debug!(
            category = %category,
            as_of = %as_of,
            bands = schedule.bands.len(),
            "loaded charge schedule"
        );
        Ok(schedule)
    }

    pub async fn quote(
        &self,
        amount: i64,
        category: ChargeCategory,
        as_of: NaiveDate,
    ) -> Result<ChargeQuote, ChargeError> {
        self.schedule(category, as_of).await?.quote(amount)
    }

    pub async fn charge_for(
        &self,
        amount: i64,
        category: ChargeCategory,
        as_of: NaiveDate,
    ) -> Result<i64, ChargeError> {
        Ok(self.quote(amount, category, as_of).await?.charge)
    }

    /// Price every item; fails on the first amount without a band.
    pub async fn charges_for_batch(
        &self,
        items: &[ChargeItem],
        as_of: NaiveDate,
    ) -> Result<Vec<ChargeQuote>, ChargeError> {
        let mut schedules: HashMap<ChargeCategory, Schedule> = HashMap::new();
        let mut quotes = Vec::with_capacity(items.len());

        for item in items {
            let schedule = match schedules.entry(item.category) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.schedule(item.category, as_of).await?),
            };
            quotes.push(schedule.quote(item.amount)?);
        }

        Ok(quotes)
    }

    pub async fn bulk_totals(
        &self,
        items: &[ChargeItem],
        as_of: NaiveDate,
    ) -> Result<BulkCharge, ChargeError> {
        let quotes = self.charges_for_batch(items, as_of).await?;
        let mut totals = BulkCharge::default();

        for quote in &quotes {
            let sum = match quote.category {
                ChargeCategory::Mobile => &mut totals.utility_charge,
                ChargeCategory::Business => &mut totals.working_charge,
            };
            *sum = sum
                .checked_add(quote.charge)
                .ok_or(ChargeError::Overflow {
                    category: quote.category,
                })?;
        }

        totals
            .utility_charge
            .checked_add(totals.working_charge)
            .ok_or(ChargeError::Overflow {
                category: ChargeCategory::Business,
            })?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine() -> ChargeBandEngine {
        ChargeBandEngine::new(Arc::new(MemoryChargeTable::standard_tariff(date(2024, 1, 1))))
    }

    #[tokio::test]
    async fn test_band_boundaries_are_inclusive() {
        let engine = engine();
        let today = date(2025, 6, 1);

        for (amount, charge) in [(0, 200), (4_900, 200), (5_000, 300), (10_000, 300), (10_100, 800)] {
            assert_eq!(
                engine
                    .charge_for(amount, ChargeCategory::Business, today)
                    .await
                    .unwrap(),
                charge,
                "business charge for {}",
                amount
            );
        }
        assert_eq!(
            engine
                .charge_for(10_000, ChargeCategory::Mobile, today)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            engine
                .charge_for(10_100, ChargeCategory::Mobile, today)
                .await
                .unwrap(),
            500
        );
    }

    #[tokio::test]
    async fn test_gap_between_bands_is_an_error() {
        let err = engine()
            .charge_for(4_950, ChargeCategory::Business, date(2025, 6, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No M-Pesa charge found for Kshs. 49.50 (business) as of 2025-06-01"
        );
    }

    #[tokio::test]
    async fn test_nothing_applies_before_the_first_effective_date() {
        let err = engine()
            .charge_for(1_000, ChargeCategory::Mobile, date(2023, 12, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::NoBand { .. }));
    }

    #[tokio::test]
    async fn test_charges_never_decrease_with_amount() {
        let engine = engine();
        let today = date(2025, 6, 1);

        for category in [ChargeCategory::Mobile, ChargeCategory::Business] {
            let table = match category {
                ChargeCategory::Mobile => MOBILE_TARIFF,
                ChargeCategory::Business => BUSINESS_TARIFF,
            };
            let mut previous = 0;
            for &(min, max, _) in table {
                for amount in [min, max.unwrap_or(min)] {
                    let charge = engine.charge_for(amount, category, today).await.unwrap();
                    assert!(charge >= previous, "{} {} dropped", category, amount);
                    previous = charge;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_latest_effective_date_wins() {
        let table = Arc::new(MemoryChargeTable::standard_tariff(date(2024, 1, 1)));
        table
            .insert(ChargeBand {
                category: ChargeCategory::Mobile,
                min_amount: 0,
                max_amount: None,
                charge: 700,
                effective_date: date(2025, 1, 1),
            })
            .await;
        let engine = ChargeBandEngine::new(table);

        assert_eq!(
            engine
                .charge_for(1_000, ChargeCategory::Mobile, date(2024, 12, 31))
                .await
                .unwrap(),
            0
        );

        let quote = engine
            .quote(90_000_000, ChargeCategory::Mobile, date(2025, 1, 1))
            .await
            .unwrap();
        assert_eq!(quote.charge, 700);
        assert_eq!(quote.band_max, None);
        assert_eq!(quote.effective_date, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn test_batch_matches_single_lookups() {
        let engine = engine();
        let today = date(2025, 6, 1);
        let items = vec![
            ChargeItem {
                amount: 100_000,
                category: ChargeCategory::Mobile,
            },
            ChargeItem {
                amount: 600_000,
                category: ChargeCategory::Business,
            },
            ChargeItem {
                amount: 5_000,
                category: ChargeCategory::Mobile,
            },
        ];

        let quotes = engine.charges_for_batch(&items, today).await.unwrap();
        for (item, quote) in items.iter().zip(&quotes) {
            let single = engine
                .charge_for(item.amount, item.category, today)
                .await
                .unwrap();
            assert_eq!(quote.charge, single);
        }

        let totals = engine.bulk_totals(&items, today).await.unwrap();
        assert_eq!(totals.utility_charge, 500);
        assert_eq!(totals.working_charge, 4_800);
        assert_eq!(totals.total(), 5_300);
    }

    #[tokio::test]
    async fn test_batch_fails_on_unpriced_item() {
        let items = [ChargeItem {
            amount: 30_000_000,
            category: ChargeCategory::Mobile,
        }];
        assert!(engine()
            .bulk_totals(&items, date(2025, 6, 1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_new_tariff_applies_without_restart() {
        let today = date(2025, 6, 1);
        let table = Arc::new(MemoryChargeTable::new(vec![ChargeBand {
            category: ChargeCategory::Mobile,
            min_amount: 0,
            max_amount: Some(10_000),
            charge: 0,
            effective_date: date(2024, 1, 1),
        }]));
        let engine = ChargeBandEngine::new(table.clone());

        assert_eq!(
            engine
                .charge_for(1_000, ChargeCategory::Mobile, today)
                .await
                .unwrap(),
            0
        );

        table
            .insert(ChargeBand {
                category: ChargeCategory::Mobile,
                min_amount: 0,
                max_amount: Some(10_000),
                charge: 700,
                effective_date: today,
            })
            .await;

        assert_eq!(
            engine
                .charge_for(1_000, ChargeCategory::Mobile, today)
                .await
                .unwrap(),
            700
        );
    }

    #[tokio::test]
    async fn test_bulk_totals_reject_overflowing_sums() {
        let table = Arc::new(MemoryChargeTable::new(vec![ChargeBand {
            category: ChargeCategory::Business,
            min_amount: 0,
            max_amount: None,
            charge: i64::MAX / 2 + 1,
            effective_date: date(2024, 1, 1),
        }]));
        let items = [ChargeItem {
            amount: 100,
            category: ChargeCategory::Business,
        }; 2];

        let err = ChargeBandEngine::new(table)
            .bulk_totals(&items, date(2025, 6, 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChargeError::Overflow {
                category: ChargeCategory::Business
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_category_parses_case_insensitively() {
        assert_eq!("Mobile".parse::<ChargeCategory>(), Ok(ChargeCategory::Mobile));
        assert!("agent".parse::<ChargeCategory>().is_err());
    }
}
