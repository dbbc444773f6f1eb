#![no_std]

//! Linear allowances: a source account lets a delegate pull a token from it at
//! a fixed drip rate per day. Accrual is lazy and booked in whole days, and
//! every pull is clamped to both the accrued allowance and the source's live
//! token balance.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, token, Address, Env, Vec,
};

mod accrual;
mod events;
mod storage;

pub use accrual::{AllowanceData, SECONDS_PER_DAY};

#[contract]
pub struct LinearAllowanceContract;

#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct RateUpdate {
    pub delegate: Address,
    pub token: Address,
    pub drip_rate_per_day: i128,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct TransferRequest {
    pub source: Address,
    pub token: Address,
    pub destination: Address,
}

#[contracterror]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    /// The authenticated caller tried to configure another account's allowance.
    NotAuthorized = 1,
    /// Nothing has accrued for the delegate yet.
    NoAllowance = 2,
    /// The token contract failed, or moved a different amount than requested.
    TransferFailed = 3,
    MathOverflow = 4,
    /// A transfer is already in flight.
    Reentrant = 5,
    InvalidRate = 6,
    /// The ledger clock is behind the last booking.
    InvalidTimestamp = 7,
}

fn reprice_allowance(
    env: &Env,
    source: &Address,
    delegate: &Address,
    token: &Address,
    drip_rate_per_day: i128,
) -> Result<(), Error> {
    let mut allowance = storage::read_allowance(env, source, delegate, token);
    allowance.reprice(drip_rate_per_day, env.ledger().timestamp())?;
    storage::write_allowance(env, source, delegate, token, &allowance);

    events::rate_changed(env, source, delegate, token, drip_rate_per_day);
    log!(
        env,
        "allowance repriced",
        drip_rate_per_day,
        allowance.total_unspent
    );
    Ok(())
}

/// Current balance of `holder`, as reported by the token contract.
fn token_balance(client: &token::Client, holder: &Address) -> Result<i128, Error> {
    match client.try_balance(holder) {
        Ok(Ok(balance)) => Ok(balance),
        _ => Err(Error::TransferFailed),
    }
}

/// Pulls `amount` out of `source` using the approval it granted this contract,
/// then checks the source balance moved by exactly `amount`.
fn move_funds(
    env: &Env,
    client: &token::Client,
    source: &Address,
    destination: &Address,
    amount: i128,
    balance_before: i128,
) -> Result<(), Error> {
    let spender = env.current_contract_address();
    match client.try_transfer_from(&spender, source, destination, &amount) {
        Ok(Ok(())) => {}
        _ => return Err(Error::TransferFailed),
    }

    let expected = if source == destination {
        balance_before
    } else {
        balance_before
            .checked_sub(amount)
            .ok_or(Error::MathOverflow)?
    };
    if token_balance(client, source)? != expected {
        return Err(Error::TransferFailed);
    }
    Ok(())
}

/// Body of a single transfer. Callers must hold the transfer lock.
fn transfer_accrued(
    env: &Env,
    delegate: &Address,
    source: &Address,
    token: &Address,
    destination: &Address,
) -> Result<i128, Error> {
    // Staged locally; nothing is written until the move has been verified.
    let mut allowance = storage::read_allowance(env, source, delegate, token);
    allowance.accrue(env.ledger().timestamp())?;

    if allowance.total_unspent == 0 {
        return Err(Error::NoAllowance);
    }

    let client = token::Client::new(env, token);
    let balance = token_balance(&client, source)?;
    let amount = allowance.total_unspent.min(balance.max(0));

    if amount > 0 {
        move_funds(env, &client, source, destination, amount, balance)?;
        allowance.spend(amount)?;
    }

    storage::write_allowance(env, source, delegate, token, &allowance);

    events::transfer_executed(env, source, delegate, token, destination, amount);
    log!(
        env,
        "allowance transferred",
        amount,
        allowance.total_unspent,
        allowance.total_spent
    );
    Ok(amount)
}

/// Takes the transfer lock. The host already refuses contract re-entry, so a
/// token calling back during `transfer_from` never reaches this check; the
/// lock is defence in depth for any path that bypasses that ban.
fn acquire_transfer_lock(env: &Env) -> Result<(), Error> {
    if storage::is_transfer_locked(env) {
        return Err(Error::Reentrant);
    }
    storage::lock_transfers(env);
    Ok(())
}

#[contractimpl]
impl LinearAllowanceContract {
    /// Sets the daily drip rate `delegate` earns on `source`'s `token`.
    ///
    /// Whatever accrued under the previous rate is booked first; the new rate
    /// applies from the current ledger timestamp. A rate of 0 pauses accrual
    /// and keeps the unspent balance claimable.
    pub fn set_rate(
        env: Env,
        caller: Address,
        source: Address,
        delegate: Address,
        token: Address,
        drip_rate_per_day: i128,
    ) -> Result<(), Error> {
        caller.require_auth();
        if caller != source {
            return Err(Error::NotAuthorized);
        }

        reprice_allowance(&env, &source, &delegate, &token, drip_rate_per_day)
    }

    /// Applies several rate updates for one source. Either all of them land
    /// or none do.
    pub fn set_rates(
        env: Env,
        caller: Address,
        source: Address,
        updates: Vec<RateUpdate>,
    ) -> Result<(), Error> {
        caller.require_auth();
        if caller != source {
            return Err(Error::NotAuthorized);
        }

        for update in updates.iter() {
            reprice_allowance(
                &env,
                &source,
                &update.delegate,
                &update.token,
                update.drip_rate_per_day,
            )?;
        }
        Ok(())
    }

    /// Moves everything `delegate` has accrued on `source`'s `token` to
    /// `destination`, capped by what `source` actually holds. Returns the
    /// amount moved, which is 0 when the source is empty.
    ///
    /// The source must have approved this contract as a spender on the token.
    pub fn execute_transfer(
        env: Env,
        delegate: Address,
        source: Address,
        token: Address,
        destination: Address,
    ) -> Result<i128, Error> {
        delegate.require_auth();
        acquire_transfer_lock(&env)?;

        let result = transfer_accrued(&env, &delegate, &source, &token, &destination);

        storage::unlock_transfers(&env);
        result
    }

    /// Batch form of `execute_transfer` for one delegate. Any failure aborts
    /// the whole batch.
    ///
    /// Each (source, token) pair must appear once: the first entry drains the
    /// allowance, so a repeat fails with `NoAllowance` and undoes the batch.
    pub fn execute_transfers(
        env: Env,
        delegate: Address,
        requests: Vec<TransferRequest>,
    ) -> Result<Vec<i128>, Error> {
        delegate.require_auth();
        acquire_transfer_lock(&env)?;

        let mut amounts = Vec::new(&env);
        for request in requests.iter() {
            match transfer_accrued(
                &env,
                &delegate,
                &request.source,
                &request.token,
                &request.destination,
            ) {
                Ok(amount) => amounts.push_back(amount),
                Err(err) => {
                    storage::unlock_transfers(&env);
                    return Err(err);
                }
            }
        }

        storage::unlock_transfers(&env);
        Ok(amounts)
    }

    /// Unspent allowance as of now. 0 for an allowance that was never set.
    pub fn get_unspent(
        env: Env,
        source: Address,
        delegate: Address,
        token: Address,
    ) -> Result<i128, Error> {
        storage::read_allowance(&env, &source, &delegate, &token)
            .unspent_at(env.ledger().timestamp())
    }

    /// The record as last booked, without accruing up to now.
    pub fn get_allowance_data(
        env: Env,
        source: Address,
        delegate: Address,
        token: Address,
    ) -> AllowanceData {
        storage::read_allowance(&env, &source, &delegate, &token)
    }

    /// What `execute_transfer` would move right now.
    pub fn get_max_withdrawable(
        env: Env,
        source: Address,
        delegate: Address,
        token: Address,
    ) -> Result<i128, Error> {
        let unspent = storage::read_allowance(&env, &source, &delegate, &token)
            .unspent_at(env.ledger().timestamp())?;
        if unspent == 0 {
            return Ok(0);
        }

        let balance = token_balance(&token::Client::new(&env, &token), &source)?;
        Ok(unspent.min(balance.max(0)))
    }
}

mod test_token_faults;
