//! The running balance of a tenancy.
//!
//! Positive balances are owed by the tenant, negative balances are credit.
//! Every function that touches the balance takes an open transaction; the
//! caller owns commit.

use pgstay_core::{BillingError, BillingResult, StoreResult, TenancyTx};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Smallest unit the ledger stores.
pub const MONEY_SCALE: u32 = 2;

/// Accepts a positive amount expressible in whole paise.
///
/// Balances and payments are persisted at two decimal places, so a finer
/// amount would be rounded differently in each column.
pub fn checked_amount(amount: Decimal) -> BillingResult<Decimal> {
    if amount <= Decimal::ZERO || amount.normalize().scale() > MONEY_SCALE {
        return Err(BillingError::InvalidAmount(amount));
    }
    Ok(amount)
}

/// First month's rent plus the room's deposit, due on admission.
pub fn initial_due(monthly_rent: Decimal, room_deposit: Decimal) -> Decimal {
    monthly_rent + room_deposit
}

/// Activates a verified profile and seeds its balance.
pub async fn open<T: TenancyTx>(
    tx: &mut T,
    identity_id: Uuid,
    initial_due: Decimal,
) -> StoreResult<()> {
    tx.activate_profile(identity_id, initial_due).await
}

pub async fn accrue<T: TenancyTx>(
    tx: &mut T,
    identity_id: Uuid,
    amount: Decimal,
) -> StoreResult<Decimal> {
    tx.adjust_balance(identity_id, amount).await
}

pub async fn settle<T: TenancyTx>(
    tx: &mut T,
    identity_id: Uuid,
    amount: Decimal,
) -> StoreResult<Decimal> {
    tx.adjust_balance(identity_id, -amount).await
}

pub fn is_settled(balance: Decimal) -> bool {
    balance.is_zero()
}

pub fn display_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_due_is_rent_plus_deposit() {
        assert_eq!(
            initial_due(Decimal::from(5000), Decimal::from(2000)),
            Decimal::from(7000)
        );
    }

    #[test]
    fn credit_is_not_settled() {
        assert!(is_settled(Decimal::new(0, 2)));
        assert!(!is_settled(Decimal::new(-150, 0)));
        assert!(!is_settled(Decimal::new(1, 2)));
    }

    #[test]
    fn amounts_finer_than_paise_are_rejected() {
        assert_eq!(
            checked_amount(Decimal::new(450050, 2)).unwrap(),
            Decimal::new(450050, 2)
        );
        assert!(checked_amount(Decimal::new(1005000, 4)).is_ok());
        assert!(matches!(
            checked_amount(Decimal::new(100005, 3)),
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(checked_amount(Decimal::ZERO).is_err());
        assert!(checked_amount(Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn amounts_display_with_two_decimals() {
        assert_eq!(display_amount(Decimal::from(9000)), "9000.00");
        assert_eq!(display_amount(Decimal::new(12345, 3)), "12.35");
    }
}
