use crate::data::TransactionTable;
use crate::types::{AggregatePoint, Centroid, PipelineOutcome, TransactionRecord};
use geo::{Centroid as _, MultiPoint, Point};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const AGE_LIMIT: u32 = 99;
/// Raw yen per 坪 are shown in units of 万円.
pub const MAN_YEN: f64 = 10_000.0;
pub const PRICE_SUFFIX: &str = "万円/坪";

/// Inclusive building-age bounds. `min > max` is allowed and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl AgeRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, age: u32) -> bool {
        self.min <= age && age <= self.max
    }
}

impl Default for AgeRange {
    fn default() -> Self {
        Self { min: 0, max: AGE_LIMIT }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterCriteria {
    pub price_category: String,
    pub prefecture: String,
    pub municipality: String,
    pub age: AgeRange,
    /// `None` keeps every period.
    pub period: Option<String>,
}

impl FilterCriteria {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        record.price_category == self.price_category
            && record.prefecture == self.prefecture
            && record.municipality == self.municipality
            && self.age.contains(record.age)
            && self.period.as_ref().map_or(true, |p| &record.period == p)
    }
}

pub fn filter<'a>(
    table: &'a TransactionTable,
    criteria: &FilterCriteria,
) -> Vec<&'a TransactionRecord> {
    table
        .records()
        .iter()
        .filter(|record| criteria.matches(record))
        .collect()
}

// Coordinates are keyed by bit pattern so identical floats land in the same group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey<'a> {
    period: &'a str,
    municipality: &'a str,
    district_name: &'a str,
    latitude: u64,
    longitude: u64,
}

impl<'a> GroupKey<'a> {
    fn of(record: &'a TransactionRecord) -> Self {
        Self {
            period: &record.period,
            municipality: &record.municipality,
            district_name: &record.district_name,
            latitude: record.latitude.to_bits(),
            longitude: record.longitude.to_bits(),
        }
    }
}

/// Mean unit price of a group in 万円, truncated toward zero.
pub fn average_man_yen(unit_prices: &[f64]) -> Option<i64> {
    if unit_prices.is_empty() {
        return None;
    }
    let mean = unit_prices.iter().sum::<f64>() / unit_prices.len() as f64;
    // `as` saturates at the i64 bounds; trunc() makes the rounding mode explicit.
    Some((mean / MAN_YEN).trunc() as i64)
}

pub fn price_label(man_yen: i64) -> String {
    format!("{}{}", man_yen, PRICE_SUFFIX)
}

/// Groups the subset by (period, municipality, district, lat, lon) and averages
/// each group's unit price. Callers must not pass an empty subset; see [`run`].
pub fn aggregate(subset: &[&TransactionRecord]) -> Vec<AggregatePoint> {
    let mut groups: BTreeMap<GroupKey, (&TransactionRecord, Vec<f64>)> = BTreeMap::new();
    for &record in subset {
        groups
            .entry(GroupKey::of(record))
            .or_insert_with(|| (record, Vec::new()))
            .1
            .push(record.unit_price);
    }

    groups
        .into_values()
        .filter_map(|(first, prices)| {
            let man_yen = average_man_yen(&prices)?;
            Some(AggregatePoint {
                period: first.period.clone(),
                municipality: first.municipality.clone(),
                district_name: first.district_name.clone(),
                latitude: first.latitude,
                longitude: first.longitude,
                man_yen,
                price_label: price_label(man_yen),
                transactions: prices.len(),
            })
        })
        .collect()
}

/// Mean latitude and longitude over the distinct coordinates of `points`.
pub fn centroid(points: &[AggregatePoint]) -> Option<Centroid> {
    let distinct: BTreeSet<(u64, u64)> = points
        .iter()
        .map(|p| (p.longitude.to_bits(), p.latitude.to_bits()))
        .collect();

    let multi: MultiPoint<f64> = distinct
        .into_iter()
        .map(|(x, y)| Point::new(f64::from_bits(x), f64::from_bits(y)))
        .collect();

    multi.centroid().map(Centroid::from)
}

/// Runs filter → aggregate → centroid. An empty filter result short-circuits
/// into [`PipelineOutcome::Empty`] without aggregating.
pub fn run(table: &TransactionTable, criteria: &FilterCriteria) -> PipelineOutcome {
    let subset = filter(table, criteria);
    debug!("{} of {} transactions match {:?}", subset.len(), table.len(), criteria);

    if subset.is_empty() {
        return PipelineOutcome::Empty;
    }

    let points = aggregate(&subset);
    match centroid(&points) {
        Some(centroid) => PipelineOutcome::Points { points, centroid },
        None => PipelineOutcome::Empty,
    }
}
