use soroban_sdk::{symbol_short, Address, Env};

pub(crate) fn rate_changed(
    env: &Env,
    source: &Address,
    delegate: &Address,
    token: &Address,
    new_rate: i128,
) {
    env.events().publish(
        (
            symbol_short!("rate_chg"),
            source.clone(),
            delegate.clone(),
            token.clone(),
        ),
        new_rate,
    );
}

pub(crate) fn transfer_executed(
    env: &Env,
    source: &Address,
    delegate: &Address,
    token: &Address,
    destination: &Address,
    amount: i128,
) {
    env.events().publish(
        (
            symbol_short!("xfer_exec"),
            source.clone(),
            delegate.clone(),
            token.clone(),
        ),
        (destination.clone(), amount),
    );
}
