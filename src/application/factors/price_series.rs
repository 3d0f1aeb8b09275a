use crate::domain::ledger::records::PriceObservation;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Daily closing prices with a bounded, backward-only fill.
///
/// A missing day resolves to the latest earlier close no more than
/// `fill_tolerance_days` old; beyond that the price is unknown.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    closes: BTreeMap<NaiveDate, f64>,
    fill_tolerance_days: i64,
}

impl PriceSeries {
    /// `observations` are expected validated (positive, one per day).
    pub fn new(observations: &[PriceObservation], fill_tolerance_days: i64) -> Self {
        Self {
            closes: observations
                .iter()
                .map(|p| (p.day, p.closing_price))
                .collect(),
            fill_tolerance_days: fill_tolerance_days.max(0),
        }
    }

    pub fn price_on(&self, day: NaiveDate) -> Option<f64> {
        let (observed, price) = self.closes.range(..=day).next_back()?;
        ((day - *observed).num_days() <= self.fill_tolerance_days).then_some(*price)
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_fill_is_bounded_and_backward_only() {
        let series = PriceSeries::new(
            &[
                PriceObservation {
                    day: day(2),
                    closing_price: 100.0,
                },
                PriceObservation {
                    day: day(10),
                    closing_price: 120.0,
                },
            ],
            2,
        );
        assert_eq!(series.price_on(day(1)), None);
        assert_eq!(series.price_on(day(2)), Some(100.0));
        assert_eq!(series.price_on(day(4)), Some(100.0));
        assert_eq!(series.price_on(day(5)), None);
        assert_eq!(series.price_on(day(10)), Some(120.0));
    }
}
