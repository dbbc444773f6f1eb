use soroban_sdk::contracttype;

use crate::Error;

/// Length of one accrual period. Drip rates are quoted per period and only
/// whole periods accrue.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Booked state of one (source, delegate, token) allowance.
///
/// A record whose `last_accrual_ts` is 0 has never been configured and reads
/// as all zeros.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[contracttype]
pub struct AllowanceData {
    /// Token units released per 86 400 seconds.
    pub drip_rate_per_day: i128,
    /// Accrued and not yet transferred, as of `last_accrual_ts`.
    pub total_unspent: i128,
    /// Lifetime amount transferred. Never decreases.
    pub total_spent: i128,
    pub last_accrual_ts: u64,
}

impl AllowanceData {
    pub fn is_initialized(&self) -> bool {
        self.last_accrual_ts != 0
    }

    /// Books every whole day elapsed since `last_accrual_ts` into
    /// `total_unspent`. The clock advances by whole days only, so a partial
    /// day keeps counting toward the next booking.
    pub fn accrue(&mut self, now: u64) -> Result<(), Error> {
        if !self.is_initialized() {
            self.last_accrual_ts = now;
            return Ok(());
        }

        if now < self.last_accrual_ts {
            return Err(Error::InvalidTimestamp);
        }

        let days = (now - self.last_accrual_ts) / SECONDS_PER_DAY;
        if days == 0 {
            return Ok(());
        }

        if self.drip_rate_per_day < 0 {
            return Err(Error::InvalidRate);
        }

        let accrued = self
            .drip_rate_per_day
            .checked_mul(i128::from(days))
            .ok_or(Error::MathOverflow)?;
        self.total_unspent = self
            .total_unspent
            .checked_add(accrued)
            .ok_or(Error::MathOverflow)?;

        // days * SECONDS_PER_DAY <= now - last_accrual_ts
        self.last_accrual_ts += days * SECONDS_PER_DAY;
        Ok(())
    }

    /// Settles under the old rate, then starts the new rate from `now`.
    pub fn reprice(&mut self, drip_rate_per_day: i128, now: u64) -> Result<(), Error> {
        if drip_rate_per_day < 0 {
            return Err(Error::InvalidRate);
        }

        self.accrue(now)?;
        self.last_accrual_ts = now;
        self.drip_rate_per_day = drip_rate_per_day;
        Ok(())
    }

    /// Unspent allowance as of `now`, without touching the booked state.
    pub fn unspent_at(&self, now: u64) -> Result<i128, Error> {
        if !self.is_initialized() {
            return Ok(0);
        }

        let mut preview = self.clone();
        preview.accrue(now)?;
        Ok(preview.total_unspent)
    }

    pub fn spend(&mut self, amount: i128) -> Result<(), Error> {
        if amount < 0 || amount > self.total_unspent {
            return Err(Error::MathOverflow);
        }

        self.total_unspent -= amount;
        self.total_spent = self
            .total_spent
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{AllowanceData, SECONDS_PER_DAY};
    use crate::Error;

    const T0: u64 = 1_700_000_000;

    fn active(rate: i128) -> AllowanceData {
        AllowanceData {
            drip_rate_per_day: rate,
            total_unspent: 0,
            total_spent: 0,
            last_accrual_ts: T0,
        }
    }

    #[test]
    fn test_uninitialized_reads_as_zero() {
        let record = AllowanceData::default();
        assert!(!record.is_initialized());
        assert_eq!(record.unspent_at(T0 + 365 * SECONDS_PER_DAY), Ok(0));
    }

    #[test]
    fn test_first_accrual_only_stamps_the_clock() {
        let mut record = AllowanceData::default();
        record.accrue(T0).unwrap();
        assert_eq!(record.last_accrual_ts, T0);
        assert_eq!(record.total_unspent, 0);
    }

    #[test]
    fn test_only_whole_days_accrue() {
        let record = active(100);
        assert_eq!(record.unspent_at(T0 + SECONDS_PER_DAY - 1), Ok(0));
        assert_eq!(record.unspent_at(T0 + SECONDS_PER_DAY), Ok(100));
        assert_eq!(record.unspent_at(T0 + 10 * SECONDS_PER_DAY - 1), Ok(900));
        assert_eq!(record.unspent_at(T0 + 10 * SECONDS_PER_DAY), Ok(1_000));
    }

    #[test]
    fn test_partial_day_carries_to_next_booking() {
        let mut record = active(24);
        record.accrue(T0 + SECONDS_PER_DAY + SECONDS_PER_DAY / 2).unwrap();
        assert_eq!(record.total_unspent, 24);
        assert_eq!(record.last_accrual_ts, T0 + SECONDS_PER_DAY);

        record.accrue(T0 + 2 * SECONDS_PER_DAY).unwrap();
        assert_eq!(record.total_unspent, 48);
        assert_eq!(record.last_accrual_ts, T0 + 2 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_reprice_snaps_clock_and_keeps_accrued() {
        let mut record = active(10);
        let now = T0 + 3 * SECONDS_PER_DAY + 7;
        record.reprice(50, now).unwrap();
        assert_eq!(record.total_unspent, 30);
        assert_eq!(record.drip_rate_per_day, 50);
        assert_eq!(record.last_accrual_ts, now);

        assert_eq!(record.unspent_at(now + 2 * SECONDS_PER_DAY), Ok(130));
    }

    #[test]
    fn test_zero_rate_freezes_unspent() {
        let mut record = active(10);
        record.reprice(0, T0 + 5 * SECONDS_PER_DAY).unwrap();
        assert_eq!(record.total_unspent, 50);
        assert_eq!(record.unspent_at(T0 + 500 * SECONDS_PER_DAY), Ok(50));
    }

    #[test]
    fn test_reprice_rejects_negative_rate() {
        let mut record = active(10);
        let before = record.clone();
        assert_eq!(record.reprice(-1, T0 + SECONDS_PER_DAY), Err(Error::InvalidRate));
        assert_eq!(record, before);
    }

    #[test]
    fn test_clock_regression_is_rejected() {
        let record = active(10);
        assert_eq!(record.unspent_at(T0 - 1), Err(Error::InvalidTimestamp));
    }

    #[test]
    fn test_accrual_overflow_is_rejected() {
        let record = active(i128::MAX);
        assert_eq!(record.unspent_at(T0 + SECONDS_PER_DAY), Ok(i128::MAX));
        assert_eq!(
            record.unspent_at(T0 + 2 * SECONDS_PER_DAY),
            Err(Error::MathOverflow)
        );

        let mut nearly_full = active(1);
        nearly_full.total_unspent = i128::MAX;
        assert_eq!(
            nearly_full.unspent_at(T0 + SECONDS_PER_DAY),
            Err(Error::MathOverflow)
        );
    }

    #[test]
    fn test_spend_moves_unspent_into_spent() {
        let mut record = active(100);
        record.accrue(T0 + 10 * SECONDS_PER_DAY).unwrap();
        record.spend(400).unwrap();
        assert_eq!(record.total_unspent, 600);
        assert_eq!(record.total_spent, 400);

        record.spend(600).unwrap();
        assert_eq!(record.total_unspent, 0);
        assert_eq!(record.total_spent, 1_000);
    }

    #[test]
    fn test_spend_more_than_unspent_is_rejected() {
        let mut record = active(100);
        record.accrue(T0 + SECONDS_PER_DAY).unwrap();
        assert_eq!(record.spend(101), Err(Error::MathOverflow));
        assert_eq!(record.spend(-1), Err(Error::MathOverflow));
        assert_eq!(record.total_unspent, 100);
        assert_eq!(record.total_spent, 0);
    }
}
