use crate::domain::errors::{MalformedKind, MalformedRecord};
use crate::domain::ledger::records::{
    CreationEvent, PriceObservation, SpendEvent, TransactionRecord,
};
use tracing::warn;

/// Structural checks on raw ledger records.
///
/// Rejects records that cannot occur on a canonical chain. Callers exclude
/// and count rejected records; nothing here is fatal on its own.
pub struct LedgerRecordValidator;

impl LedgerRecordValidator {
    pub fn validate_transaction(tx: &TransactionRecord) -> Result<(), MalformedRecord> {
        if tx.fee < 0 {
            warn!(
                "Validation FAILED: transaction {} has negative fee: {}",
                tx.hash, tx.fee
            );
            return Err(MalformedRecord::new(MalformedKind::NegativeFee, &tx.hash));
        }
        Ok(())
    }

    pub fn validate_creation(event: &CreationEvent) -> Result<(), MalformedRecord> {
        if event.value < 0 {
            warn!(
                "Validation FAILED: output {}:{} has negative value: {}",
                event.transaction_hash, event.output_index, event.value
            );
            return Err(MalformedRecord::new(
                MalformedKind::NegativeValue,
                event.outpoint().to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_spend(event: &SpendEvent) -> Result<(), MalformedRecord> {
        if event.value < 0 {
            warn!(
                "Validation FAILED: input of {} spending {}:{} has negative value: {}",
                event.transaction_hash,
                event.spent_transaction_hash,
                event.spent_output_index,
                event.value
            );
            return Err(MalformedRecord::new(
                MalformedKind::NegativeValue,
                spend_label(event),
            ));
        }
        Ok(())
    }

    /// Checks a spend against the creation record it consumes.
    ///
    /// Spending within the same block (equal timestamps) is legal; spending
    /// strictly before creation is reorg noise.
    pub fn validate_spend_against(
        spend: &SpendEvent,
        creation: &CreationEvent,
    ) -> Result<(), MalformedRecord> {
        if spend.block_timestamp < creation.block_timestamp {
            warn!(
                "Validation FAILED: {} spent at {} before creation at {}",
                spend_label(spend),
                spend.block_timestamp,
                creation.block_timestamp
            );
            return Err(MalformedRecord::new(
                MalformedKind::SpendBeforeCreation,
                spend_label(spend),
            ));
        }
        if spend.value != creation.value {
            warn!(
                "Validation FAILED: {} spends {} but output holds {}",
                spend_label(spend),
                spend.value,
                creation.value
            );
            return Err(MalformedRecord::new(
                MalformedKind::ValueMismatch,
                spend_label(spend),
            ));
        }
        Ok(())
    }

    pub fn validate_price(price: &PriceObservation) -> Result<(), MalformedRecord> {
        if !price.closing_price.is_finite() || price.closing_price <= 0.0 {
            warn!(
                "Validation FAILED: price for {} is non-positive: {}",
                price.day, price.closing_price
            );
            return Err(MalformedRecord::new(
                MalformedKind::NonPositivePrice,
                price.day.to_string(),
            ));
        }
        Ok(())
    }
}

fn spend_label(spend: &SpendEvent) -> String {
    format!(
        "{}<-{}:{}",
        spend.transaction_hash, spend.spent_transaction_hash, spend.spent_output_index
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn creation(value: i64, day: u32) -> CreationEvent {
        CreationEvent {
            transaction_hash: "funding".to_string(),
            output_index: 0,
            value,
            block_timestamp: Utc.with_ymd_and_hms(2023, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn spend(value: i64, day: u32) -> SpendEvent {
        SpendEvent {
            transaction_hash: "spender".to_string(),
            spent_transaction_hash: "funding".to_string(),
            spent_output_index: 0,
            value,
            block_timestamp: Utc.with_ymd_and_hms(2023, 1, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_spend_before_creation_rejected() {
        let err = LedgerRecordValidator::validate_spend_against(&spend(100, 1), &creation(100, 2))
            .unwrap_err();
        assert_eq!(err.kind, MalformedKind::SpendBeforeCreation);
    }

    #[test]
    fn test_same_block_spend_accepted() {
        assert!(
            LedgerRecordValidator::validate_spend_against(&spend(100, 2), &creation(100, 2))
                .is_ok()
        );
    }

    #[test]
    fn test_value_mismatch_rejected() {
        let err = LedgerRecordValidator::validate_spend_against(&spend(99, 3), &creation(100, 2))
            .unwrap_err();
        assert_eq!(err.kind, MalformedKind::ValueMismatch);
    }

    #[test]
    fn test_negative_values_rejected() {
        assert!(LedgerRecordValidator::validate_creation(&creation(-1, 2)).is_err());
        assert!(LedgerRecordValidator::validate_spend(&spend(-5, 2)).is_err());
        assert!(LedgerRecordValidator::validate_creation(&creation(0, 2)).is_ok());
    }

    #[test]
    fn test_price_validation() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(
            LedgerRecordValidator::validate_price(&PriceObservation {
                day,
                closing_price: 0.0
            })
            .is_err()
        );
        assert!(
            LedgerRecordValidator::validate_price(&PriceObservation {
                day,
                closing_price: 16_500.0
            })
            .is_ok()
        );
    }
}
