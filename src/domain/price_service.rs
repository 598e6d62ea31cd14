use std::cell::RefCell;
use std::collections::HashMap;

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::domain::types::{AssetId, Day};

/// Abstracts the historical price store behind the three operations the engines
/// need: the trading-day calendar, a bulk price lookup, and month-boundary
/// detection for Value Averaging. Backed here by an in-memory table built from a
/// supplied timeseries; a real deployment would source the same table from a
/// price database, which is out of scope for this crate.
pub struct PriceService {
    /// `(asset, day) -> adjusted close`, the full universe this instance was built from.
    prices: HashMap<(AssetId, Day), Decimal>,
    /// First/last date with any observation, per asset. Used by C6 validation.
    availability: HashMap<AssetId, (Day, Day)>,
    /// Per-instance single-point lookup cache; repeated point lookups within a run
    /// cost nothing beyond the first.
    point_cache: RefCell<HashMap<(AssetId, Day), Option<Decimal>>>,
}

impl PriceService {
    /// Builds a price service from a flat list of `(asset, day, adjusted_close)`
    /// observations, e.g. loaded from a CSV fixture by the CLI front door.
    pub fn from_observations(observations: impl IntoIterator<Item = (AssetId, Day, Decimal)>) -> Self {
        let mut prices = HashMap::new();
        let mut availability: HashMap<AssetId, (Day, Day)> = HashMap::new();

        for (asset, day, price) in observations {
            prices.insert((asset, day), price);
            availability
                .entry(asset)
                .and_modify(|(first, last)| {
                    if day < *first {
                        *first = day;
                    }
                    if day > *last {
                        *last = day;
                    }
                })
                .or_insert((day, day));
        }

        Self {
            prices,
            availability,
            point_cache: RefCell::new(HashMap::new()),
        }
    }

    /// All distinct dates on which any asset in `asset_ids` has a price, ascending.
    /// Empty if none of the assets have data in range.
    pub fn trading_days(&self, asset_ids: &[AssetId], start: Day, end: Day) -> Vec<Day> {
        let mut days: Vec<Day> = self
            .prices
            .keys()
            .filter(|(asset, day)| asset_ids.contains(asset) && *day >= start && *day <= end)
            .map(|(_, day)| *day)
            .collect();
        days.sort();
        days.dedup();
        days
    }

    /// Bulk-materialises `(asset, day) -> price` for the given assets and range.
    /// Subsequent lookups against the returned map are O(1).
    pub fn price_lookup(
        &self,
        asset_ids: &[AssetId],
        start: Day,
        end: Day,
    ) -> HashMap<(AssetId, Day), Decimal> {
        self.prices
            .iter()
            .filter(|((asset, day), _)| asset_ids.contains(asset) && *day >= start && *day <= end)
            .map(|(key, price)| (*key, *price))
            .collect()
    }

    /// Single-point lookup, memoised. Returns `None` if there is no observation —
    /// callers must treat absence explicitly, never substitute zero or a stale price.
    pub fn price(&self, asset: AssetId, day: Day) -> Option<Decimal> {
        if let Some(cached) = self.point_cache.borrow().get(&(asset, day)) {
            return *cached;
        }
        let price = self.prices.get(&(asset, day)).copied();
        self.point_cache.borrow_mut().insert((asset, day), price);
        price
    }

    /// True iff `day` is present in `trading_days` and no day in `trading_days`
    /// strictly precedes it within the same (year, month).
    pub fn is_first_trading_day_of_month(day: Day, trading_days: &[Day]) -> bool {
        if !trading_days.contains(&day) {
            return false;
        }
        !trading_days
            .iter()
            .any(|&other| other < day && other.year() == day.year() && other.month() == day.month())
    }

    /// Optimistic weekday pre-filter; does not replace the calendar derived from
    /// actual price data.
    pub fn is_trading_day(day: Day) -> bool {
        use chrono::Weekday;
        !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// First and last date with an observation for `asset`, for C6's data-availability check.
    pub fn availability(&self, asset: AssetId) -> Option<(Day, Day)> {
        self.availability.get(&asset).copied()
    }

    pub fn has_asset(&self, asset: AssetId) -> bool {
        self.availability.contains_key(&asset)
    }

    /// Every observation recorded for `asset`, ascending by date. Feeds the Monte
    /// Carlo engine's monthly-return derivation.
    pub fn timeseries(&self, asset: AssetId) -> Vec<(Day, Decimal)> {
        let mut series: Vec<(Day, Decimal)> = self
            .prices
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .map(|((_, day), price)| (*day, *price))
            .collect();
        series.sort_by_key(|(day, _)| *day);
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_service() -> PriceService {
        PriceService::from_observations([
            (1, d(2024, 1, 2), dec!(100)),
            (1, d(2024, 1, 3), dec!(101)),
            (1, d(2024, 2, 1), dec!(105)),
            (2, d(2024, 1, 2), dec!(50)),
        ])
    }

    #[test]
    fn trading_days_are_sorted_and_deduplicated() {
        let svc = sample_service();
        let days = svc.trading_days(&[1, 2], d(2024, 1, 1), d(2024, 2, 28));
        assert_eq!(days, vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 2, 1)]);
    }

    #[test]
    fn price_lookup_is_scoped_to_requested_assets() {
        let svc = sample_service();
        let lookup = svc.price_lookup(&[1], d(2024, 1, 1), d(2024, 2, 28));
        assert_eq!(lookup.len(), 3);
        assert!(!lookup.contains_key(&(2, d(2024, 1, 2))));
    }

    #[test]
    fn missing_price_is_none_not_zero() {
        let svc = sample_service();
        assert_eq!(svc.price(1, d(2024, 1, 5)), None);
        assert_eq!(svc.price(1, d(2024, 1, 2)), Some(dec!(100)));
    }

    #[test]
    fn first_trading_day_of_month_detection() {
        let days = vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 2, 1)];
        assert!(PriceService::is_first_trading_day_of_month(d(2024, 1, 2), &days));
        assert!(!PriceService::is_first_trading_day_of_month(d(2024, 1, 3), &days));
        assert!(PriceService::is_first_trading_day_of_month(d(2024, 2, 1), &days));
        assert!(!PriceService::is_first_trading_day_of_month(d(2024, 3, 1), &days));
    }

    #[test]
    fn is_trading_day_rejects_weekends() {
        assert!(PriceService::is_trading_day(d(2024, 1, 2)));
        assert!(!PriceService::is_trading_day(d(2024, 1, 6)));
        assert!(!PriceService::is_trading_day(d(2024, 1, 7)));
    }

    #[test]
    fn timeseries_is_sorted_ascending_and_scoped_to_asset() {
        let svc = sample_service();
        let series = svc.timeseries(1);
        assert_eq!(series, vec![
            (d(2024, 1, 2), dec!(100)),
            (d(2024, 1, 3), dec!(101)),
            (d(2024, 2, 1), dec!(105)),
        ]);
    }

    #[test]
    fn availability_tracks_first_and_last_observation() {
        let svc = sample_service();
        assert_eq!(svc.availability(1), Some((d(2024, 1, 2), d(2024, 2, 1))));
        assert_eq!(svc.availability(99), None);
    }
}
