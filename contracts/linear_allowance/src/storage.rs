use soroban_sdk::{contracttype, Address, Env};

use crate::accrual::AllowanceData;

#[derive(Clone)]
#[contracttype]
pub(crate) enum DataKey {
    /// Held for the duration of every transfer path.
    TransferLock,
    /// (source, delegate, token)
    Allowance(Address, Address, Address),
}

pub(crate) fn read_allowance(
    env: &Env,
    source: &Address,
    delegate: &Address,
    token: &Address,
) -> AllowanceData {
    env.storage()
        .persistent()
        .get(&DataKey::Allowance(
            source.clone(),
            delegate.clone(),
            token.clone(),
        ))
        .unwrap_or_default()
}

pub(crate) fn write_allowance(
    env: &Env,
    source: &Address,
    delegate: &Address,
    token: &Address,
    allowance: &AllowanceData,
) {
    env.storage().persistent().set(
        &DataKey::Allowance(source.clone(), delegate.clone(), token.clone()),
        allowance,
    );
}

pub(crate) fn is_transfer_locked(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::TransferLock)
}

pub(crate) fn lock_transfers(env: &Env) {
    env.storage().instance().set(&DataKey::TransferLock, &true);
}

pub(crate) fn unlock_transfers(env: &Env) {
    env.storage().instance().remove(&DataKey::TransferLock);
}
