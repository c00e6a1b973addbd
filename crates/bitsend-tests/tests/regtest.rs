//! Tests against running regtest containers.
//!
//! These need the Bitcoin Core and LND containers from the default config
//! to be up, so they are ignored by default:
//!
//! ```sh
//! cargo test -p bitsend-tests --test regtest -- --ignored
//! ```

use std::time::Duration;

use anyhow::Result;
use bitsend_core::{Config, FeeTargetCode, TxInput};
use bitsend_tests::run_for;
use bitsend_tui::SendForm;

#[tokio::test]
#[ignore = "requires running regtest containers"]
async fn test_accounts_and_balance() -> Result<()> {
    println!("Loading accounts from bitcoind...");

    let config = Config::default();
    let backend = bitsend_nodes::regtest_backend(&config)?;

    let accounts = backend.accounts.accounts().await?;
    println!("  ✓ {} account(s)", accounts.len());
    assert!(!accounts.is_empty());

    let balance = backend.accounts.get_balance(&accounts[0].code).await?;
    println!("  ✓ Balance: {}", balance.available);
    assert_eq!(balance.available.unit, "RBTC");

    Ok(())
}

#[tokio::test]
#[ignore = "requires running regtest containers"]
async fn test_propose_to_own_address() -> Result<()> {
    println!("Proposing a transaction to a regtest address...");

    let config = Config::default();
    let backend = bitsend_nodes::regtest_backend(&config)?;
    let account = backend.accounts.accounts().await?.remove(0);

    let input = TxInput {
        address: "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080".to_string(),
        amount: "0.001".to_string(),
        fee_target: FeeTargetCode::Normal,
        custom_fee: String::new(),
        send_all: false,
        selected_utxos: Vec::new(),
    };

    match backend.accounts.propose_tx(&account.code, &input).await? {
        Ok(proposal) => {
            println!("  ✓ Amount: {}", proposal.amount);
            println!("  ✓ Fee: {}", proposal.fee);
            println!("  ✓ Total: {}", proposal.total);
        }
        Err(code) => println!("  ✗ Proposal refused: {code}"),
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires running regtest containers"]
async fn test_send_form_against_bitcoind() -> Result<()> {
    println!("Driving the send form against bitcoind...");

    let config = Config::default();
    let backend = bitsend_nodes::regtest_backend(&config)?;
    let account = backend.accounts.accounts().await?.remove(0);

    let mut form = SendForm::new(backend, account, &config);
    form.init();
    form.on_address_change("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080");
    form.on_coin_amount_change("0.001");
    run_for!(form, Duration::from_secs(10));

    println!("  - valid: {}", form.valid);
    println!("  - fee: {:?}", form.proposed_fee);
    println!("  - errors: {:?}", form.errors);
    assert!(!form.is_updating_proposal);

    Ok(())
}

#[tokio::test]
#[ignore = "requires running regtest containers"]
async fn test_lightning_rejects_garbage() -> Result<()> {
    println!("Decoding an invalid invoice through LND...");

    let config = Config::default();
    let backend = bitsend_nodes::regtest_backend(&config)?;
    let Some(lightning) = backend.lightning else {
        println!("  - Lightning not configured, skipping");
        return Ok(());
    };

    let result = lightning.parse_input("definitely-not-an-invoice").await;
    match &result {
        Ok(parsed) => println!("  ✗ Unexpectedly parsed: {parsed:?}"),
        Err(e) => println!("  ✓ Rejected: {}", e.user_message()),
    }
    assert!(result.is_err());

    Ok(())
}
