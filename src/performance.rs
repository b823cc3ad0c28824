//! Reduction of daily report rows into additive per-key performance totals.

use std::collections::HashMap;
use std::hash::Hash;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::time::DateRange;

/// Aggregated metrics for one target, placement or search term over a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSlice {
    pub sales: f64,
    pub spend: f64,
    pub kenp_royalties: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub orders: u64,
}

impl PerformanceSlice {
    /// Build a slice from raw report values, clamping negatives to zero.
    pub fn from_raw(
        sales: f64,
        spend: f64,
        kenp_royalties: f64,
        impressions: i64,
        clicks: i64,
        orders: i64,
    ) -> Self {
        Self {
            sales: sales.max(0.0),
            spend: spend.max(0.0),
            kenp_royalties: kenp_royalties.max(0.0),
            impressions: impressions.max(0) as u64,
            clicks: clicks.max(0) as u64,
            orders: orders.max(0) as u64,
        }
    }
}

impl Add for PerformanceSlice {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sales: self.sales + rhs.sales,
            spend: self.spend + rhs.spend,
            kenp_royalties: self.kenp_royalties + rhs.kenp_royalties,
            impressions: self.impressions + rhs.impressions,
            clicks: self.clicks + rhs.clicks,
            orders: self.orders + rhs.orders,
        }
    }
}

impl AddAssign for PerformanceSlice {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for PerformanceSlice {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a PerformanceSlice> for PerformanceSlice {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Which report a set of rows came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Keyword,
    ProductTarget,
    Placement,
    SearchTerm,
}

/// One day of metrics for one key.
#[derive(Clone, Debug)]
pub struct DailyRow<K> {
    pub key: K,
    pub date: NaiveDate,
    pub slice: PerformanceSlice,
}

/// Sum rows per key over `range`, dropping rows that fall inside `exclude`.
pub fn aggregate<K, I>(rows: I, range: DateRange, exclude: Option<DateRange>) -> HashMap<K, PerformanceSlice>
where
    K: Eq + Hash,
    I: IntoIterator<Item = DailyRow<K>>,
{
    let mut out: HashMap<K, PerformanceSlice> = HashMap::new();
    for row in rows {
        if !range.contains(row.date) {
            continue;
        }
        if exclude.map(|b| b.contains(row.date)).unwrap_or(false) {
            continue;
        }
        *out.entry(row.key).or_default() += row.slice;
    }
    out
}
