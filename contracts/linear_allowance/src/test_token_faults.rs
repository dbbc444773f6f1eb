#![cfg(test)]

//! Tokens that misbehave inside `transfer_from`.

use super::{
    storage::DataKey, AllowanceData, Error, LinearAllowanceContract,
    LinearAllowanceContractClient, SECONDS_PER_DAY,
};
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype,
    testutils::{Address as _, Ledger},
    Address, Env, InvokeError,
};

const START: u64 = 1_700_000_000;

#[derive(Clone)]
#[contracttype]
enum MockKey {
    Balance(Address),
    Ledger,
    Delegate,
    ReentryOutcome,
}

/// How the nested `execute_transfer` ended.
const REENTRY_SUCCEEDED: u32 = 0;
const REENTRY_CONTRACT_ERROR: u32 = 1;
const REENTRY_HOST_REFUSED: u32 = 2;

fn read_balance(env: &Env, id: &Address) -> i128 {
    env.storage()
        .instance()
        .get(&MockKey::Balance(id.clone()))
        .unwrap_or(0)
}

fn write_balance(env: &Env, id: &Address, amount: i128) {
    env.storage()
        .instance()
        .set(&MockKey::Balance(id.clone()), &amount);
}

mod rejecting {
    use super::*;

    #[contracterror]
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    #[repr(u32)]
    pub enum MockError {
        Rejected = 1,
    }

    #[contract]
    pub struct RejectingToken;

    #[contractimpl]
    impl RejectingToken {
        pub fn set_balance(env: Env, id: Address, amount: i128) {
            write_balance(&env, &id, amount);
        }

        pub fn balance(env: Env, id: Address) -> i128 {
            read_balance(&env, &id)
        }

        pub fn transfer_from(
            _env: Env,
            _spender: Address,
            _from: Address,
            _to: Address,
            _amount: i128,
        ) -> Result<(), MockError> {
            Err(MockError::Rejected)
        }
    }
}

mod short_paying {
    use super::*;

    /// Reports success but keeps one unit back.
    #[contract]
    pub struct ShortPayingToken;

    #[contractimpl]
    impl ShortPayingToken {
        pub fn set_balance(env: Env, id: Address, amount: i128) {
            write_balance(&env, &id, amount);
        }

        pub fn balance(env: Env, id: Address) -> i128 {
            read_balance(&env, &id)
        }

        pub fn transfer_from(
            env: Env,
            _spender: Address,
            from: Address,
            to: Address,
            amount: i128,
        ) {
            let moved = amount - 1;
            write_balance(&env, &from, read_balance(&env, &from) - moved);
            write_balance(&env, &to, read_balance(&env, &to) + moved);
        }
    }
}

mod reentrant {
    use super::*;

    /// Calls back into the allowance contract before moving funds.
    #[contract]
    pub struct ReentrantToken;

    #[contractimpl]
    impl ReentrantToken {
        pub fn set_balance(env: Env, id: Address, amount: i128) {
            write_balance(&env, &id, amount);
        }

        pub fn arm(env: Env, ledger: Address, delegate: Address) {
            env.storage().instance().set(&MockKey::Ledger, &ledger);
            env.storage().instance().set(&MockKey::Delegate, &delegate);
        }

        pub fn reentry_outcome(env: Env) -> Option<u32> {
            env.storage().instance().get(&MockKey::ReentryOutcome)
        }

        pub fn balance(env: Env, id: Address) -> i128 {
            read_balance(&env, &id)
        }

        pub fn transfer_from(
            env: Env,
            _spender: Address,
            from: Address,
            to: Address,
            amount: i128,
        ) {
            let ledger: Option<Address> = env.storage().instance().get(&MockKey::Ledger);
            let delegate: Option<Address> = env.storage().instance().get(&MockKey::Delegate);
            if let (Some(ledger), Some(delegate)) = (ledger, delegate) {
                let inner = LinearAllowanceContractClient::new(&env, &ledger)
                    .try_execute_transfer(&delegate, &from, &env.current_contract_address(), &to);
                let outcome = match inner {
                    Ok(_) => REENTRY_SUCCEEDED,
                    Err(Ok(_)) => REENTRY_CONTRACT_ERROR,
                    Err(Err(_)) => REENTRY_HOST_REFUSED,
                };
                env.storage()
                    .instance()
                    .set(&MockKey::ReentryOutcome, &outcome);
            }

            write_balance(&env, &from, read_balance(&env, &from) - amount);
            write_balance(&env, &to, read_balance(&env, &to) + amount);
        }
    }
}

struct Setup<'a> {
    env: Env,
    contract_id: Address,
    client: LinearAllowanceContractClient<'a>,
    source: Address,
    delegate: Address,
    recipient: Address,
}

impl<'a> Setup<'a> {
    fn new() -> Self {
        let env = Env::default();
        env.mock_all_auths();
        env.ledger().with_mut(|li| li.timestamp = START);

        let contract_id = env.register(LinearAllowanceContract, ());
        let client = LinearAllowanceContractClient::new(&env, &contract_id);

        Setup {
            source: Address::generate(&env),
            delegate: Address::generate(&env),
            recipient: Address::generate(&env),
            env,
            contract_id,
            client,
        }
    }

    /// Sets a rate of 100/day on `token` and moves the clock one day ahead.
    fn accrue_one_day(&self, token: &Address) {
        self.client
            .set_rate(&self.source, &self.source, &self.delegate, token, &100);
        self.env
            .ledger()
            .with_mut(|li| li.timestamp = START + SECONDS_PER_DAY);
    }

    fn try_execute(
        &self,
        token: &Address,
    ) -> Result<Result<i128, soroban_sdk::Error>, Result<Error, InvokeError>> {
        self.client
            .try_execute_transfer(&self.delegate, &self.source, token, &self.recipient)
    }

    fn data(&self, token: &Address) -> AllowanceData {
        self.client
            .get_allowance_data(&self.source, &self.delegate, token)
    }
}

#[test]
fn test_rejected_transfer_reports_transfer_failed() {
    let s = Setup::new();
    let token = s.env.register(rejecting::RejectingToken, ());
    rejecting::RejectingTokenClient::new(&s.env, &token).set_balance(&s.source, &1_000);

    s.accrue_one_day(&token);
    let before = s.data(&token);

    assert!(matches!(s.try_execute(&token), Err(Ok(Error::TransferFailed))));
    assert_eq!(s.data(&token), before);
    assert_eq!(s.data(&token).last_accrual_ts, START);
}

#[test]
fn test_short_payment_reports_transfer_failed() {
    let s = Setup::new();
    let token = s.env.register(short_paying::ShortPayingToken, ());
    let token_client = short_paying::ShortPayingTokenClient::new(&s.env, &token);
    token_client.set_balance(&s.source, &1_000);

    s.accrue_one_day(&token);

    assert!(matches!(s.try_execute(&token), Err(Ok(Error::TransferFailed))));
    assert_eq!(token_client.balance(&s.source), 1_000);
    assert_eq!(token_client.balance(&s.recipient), 0);
    assert_eq!(s.data(&token).total_spent, 0);
}

#[test]
fn test_callback_into_ledger_is_rejected() {
    let s = Setup::new();
    let token = s.env.register(reentrant::ReentrantToken, ());
    let token_client = reentrant::ReentrantTokenClient::new(&s.env, &token);
    token_client.set_balance(&s.source, &1_000);
    token_client.arm(&s.contract_id, &s.delegate);

    s.accrue_one_day(&token);

    // The host refuses the nested call before the contract runs; the outer
    // call still completes.
    assert_eq!(
        s.client
            .execute_transfer(&s.delegate, &s.source, &token, &s.recipient),
        100
    );
    assert_eq!(token_client.reentry_outcome(), Some(REENTRY_HOST_REFUSED));
    assert_eq!(token_client.balance(&s.recipient), 100);

    let data = s.data(&token);
    assert_eq!(data.total_spent, 100);
    assert_eq!(data.total_unspent, 0);
}

#[test]
fn test_held_transfer_lock_rejects_transfers() {
    let s = Setup::new();
    let token = s.env.register(short_paying::ShortPayingToken, ());
    short_paying::ShortPayingTokenClient::new(&s.env, &token).set_balance(&s.source, &1_000);
    s.accrue_one_day(&token);

    s.env.as_contract(&s.contract_id, || {
        s.env
            .storage()
            .instance()
            .set(&DataKey::TransferLock, &true);
    });

    assert!(matches!(s.try_execute(&token), Err(Ok(Error::Reentrant))));
    assert!(matches!(
        s.client.try_execute_transfers(&s.delegate, &soroban_sdk::vec![&s.env]),
        Err(Ok(Error::Reentrant))
    ));
    assert_eq!(s.data(&token).last_accrual_ts, START);

    // Rate changes make no external call and are not gated by the lock.
    s.client
        .set_rate(&s.source, &s.source, &s.delegate, &token, &0);
    assert_eq!(s.data(&token).total_unspent, 100);
}

#[test]
fn test_lock_is_released_after_each_transfer() {
    let s = Setup::new();
    let token = s.env.register(reentrant::ReentrantToken, ());
    let token_client = reentrant::ReentrantTokenClient::new(&s.env, &token);
    token_client.set_balance(&s.source, &1_000);

    s.accrue_one_day(&token);
    assert_eq!(
        s.client
            .execute_transfer(&s.delegate, &s.source, &token, &s.recipient),
        100
    );

    s.env
        .ledger()
        .with_mut(|li| li.timestamp = START + 2 * SECONDS_PER_DAY);
    assert_eq!(
        s.client
            .execute_transfer(&s.delegate, &s.source, &token, &s.recipient),
        100
    );

    let locked = s.env.as_contract(&s.contract_id, || {
        s.env.storage().instance().has(&DataKey::TransferLock)
    });
    assert!(!locked);
}
