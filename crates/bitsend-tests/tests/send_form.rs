//! Integration tests for the on-chain send form.
//!
//! Time is paused, so debounce windows and scripted backend delays run
//! instantly and deterministically.

use std::time::Duration;

use bitsend_core::{
    Amount, BackendEvent, BtcUnit, FeeTargetCode, ProposalErrorCode, SendResult, SignProgress,
    TxProposal,
};
use bitsend_tests::{Harness, Scripted, rbtc_account, run_for};
use bitsend_tui::SendForm;
use bitsend_tui::send::{INVALID_AMOUNT, INVALID_FORMAT_ALERT, PAIRING_ALERT};

const ADDRESS: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";

fn form(harness: &Harness) -> SendForm {
    let mut form = SendForm::new(harness.backend.clone(), rbtc_account(), &harness.config);
    form.init();
    form
}

fn proposal(amount: &str) -> TxProposal {
    TxProposal {
        amount: Amount::new(amount, "RBTC"),
        fee: Amount::new("0.00000200", "RBTC"),
        total: Amount::new(amount, "RBTC"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_init_loads_balance_and_default_fee_target() {
    let harness = Harness::new();
    let mut form = form(&harness);
    run_for!(form, Duration::from_secs(1));

    assert_eq!(form.balance.as_ref().unwrap().available.amount, "0.75000000");
    assert_eq!(form.fee_target, Some(FeeTargetCode::Normal));
    assert!(form.coin_control);
    assert!(!form.paired);
    assert!(harness.wallet.proposals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_edits_within_debounce_window_issue_one_request() {
    let harness = Harness::new();
    let mut form = form(&harness);
    run_for!(form, Duration::from_secs(1));

    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.1");
    run_for!(form, Duration::from_millis(100));
    form.on_coin_amount_change("0.12");
    run_for!(form, Duration::from_millis(300));
    form.on_coin_amount_change("0.125");

    assert!(form.is_updating_proposal);
    assert!(harness.wallet.proposals().is_empty());

    run_for!(form, Duration::from_secs(1));

    let issued = harness.wallet.proposals();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].amount, "0.125");
    assert_eq!(issued[0].address, ADDRESS);
    assert_eq!(issued[0].fee_target, FeeTargetCode::Normal);

    assert!(form.valid);
    assert!(!form.is_updating_proposal);
    assert_eq!(form.proposed_amount.as_ref().unwrap().amount, "0.125");
    assert_eq!(form.fiat_amount, "6250.00");
    assert!(form.can_send());
}

#[tokio::test(start_paused = true)]
async fn test_stale_proposal_response_is_discarded() {
    let harness = Harness::new();
    harness.wallet.script(
        "1",
        Duration::from_secs(2),
        Scripted::Reply(Ok(proposal("1.00000000"))),
    );
    harness.wallet.script(
        "2",
        Duration::from_millis(100),
        Scripted::Reply(Ok(proposal("2.00000000"))),
    );

    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("1");
    run_for!(form, Duration::from_millis(500));
    assert_eq!(harness.wallet.proposals().len(), 1);

    // The second request is issued while the first is still in flight and
    // answers first.
    form.on_coin_amount_change("2");
    run_for!(form, Duration::from_millis(600));
    assert_eq!(harness.wallet.proposals().len(), 2);
    assert_eq!(form.proposed_amount.as_ref().unwrap().amount, "2.00000000");

    // Let the slow first response arrive.
    run_for!(form, Duration::from_secs(3));
    assert_eq!(form.proposed_amount.as_ref().unwrap().amount, "2.00000000");
    assert!(form.valid);
    assert!(!form.is_updating_proposal);
}

#[tokio::test(start_paused = true)]
async fn test_pending_proposal_keeps_send_disabled() {
    let harness = Harness::new();
    harness.wallet.script(
        "0.3",
        Duration::from_secs(5),
        Scripted::Reply(Ok(proposal("0.30000000"))),
    );

    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.3");
    run_for!(form, Duration::from_secs(1));

    assert!(form.is_updating_proposal);
    assert!(!form.can_send());

    run_for!(form, Duration::from_secs(5));
    assert!(form.can_send());
}

#[tokio::test(start_paused = true)]
async fn test_proposal_errors_route_to_fields() {
    let harness = Harness::new();
    harness.wallet.script(
        "5",
        Duration::ZERO,
        Scripted::Reply(Err(ProposalErrorCode::InsufficientFunds)),
    );
    harness.wallet.script(
        "6",
        Duration::ZERO,
        Scripted::Reply(Err(ProposalErrorCode::InvalidAddress)),
    );
    harness.wallet.script(
        "7",
        Duration::ZERO,
        Scripted::Reply(Err(ProposalErrorCode::Unknown("wallet locked".into()))),
    );

    let mut form = form(&harness);
    form.on_address_change(ADDRESS);

    form.on_coin_amount_change("5");
    run_for!(form, Duration::from_secs(1));
    assert!(!form.valid);
    assert_eq!(form.errors.amount.as_deref(), Some("Insufficient funds"));
    assert!(form.errors.address.is_none());
    assert!(form.alert.is_none());

    form.on_coin_amount_change("6");
    run_for!(form, Duration::from_secs(1));
    assert!(form.errors.address.is_some());
    assert!(form.errors.amount.is_none());

    form.on_coin_amount_change("7");
    run_for!(form, Duration::from_secs(1));
    assert_eq!(
        form.take_alert().as_deref(),
        Some("An unknown error occurred: wallet locked")
    );
    assert!(!form.is_updating_proposal);
}

#[tokio::test(start_paused = true)]
async fn test_custom_fee_requires_a_rate() {
    let harness = Harness::new();
    harness.wallet.script(
        "0.2",
        Duration::ZERO,
        Scripted::Reply(Err(ProposalErrorCode::FeeTooLow)),
    );

    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.2");
    form.fee_target_change(FeeTargetCode::Custom);
    run_for!(form, Duration::from_secs(1));

    assert!(form.valid_tx_input().is_none());
    assert!(harness.wallet.proposals().is_empty());

    form.set_custom_fee("0.5");
    run_for!(form, Duration::from_secs(1));
    let issued = harness.wallet.proposals();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].custom_fee, "0.5");
    assert_eq!(form.errors.fee.as_deref(), Some("Fee too low"));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_invalidates_form() {
    let harness = Harness::new();
    harness.wallet.script(
        "9",
        Duration::from_millis(50),
        Scripted::Transport("connection refused".into()),
    );

    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("9");
    run_for!(form, Duration::from_secs(1));

    assert!(!form.valid);
    assert!(!form.is_updating_proposal);
    assert!(!form.can_send());
}

#[tokio::test(start_paused = true)]
async fn test_clearing_input_cancels_scheduled_proposal() {
    let harness = Harness::new();
    let mut form = form(&harness);

    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.1");
    run_for!(form, Duration::from_millis(100));
    form.on_address_change("");
    run_for!(form, Duration::from_secs(1));

    assert!(harness.wallet.proposals().is_empty());
    assert!(!form.is_updating_proposal);
    assert!(!form.valid);
}

#[tokio::test(start_paused = true)]
async fn test_send_all_uses_proposed_amount() {
    let harness = Harness::new();
    let mut form = form(&harness);

    form.on_address_change(ADDRESS);
    form.on_send_all_change(true);
    run_for!(form, Duration::from_secs(1));

    let issued = harness.wallet.proposals();
    assert_eq!(issued.len(), 1);
    assert!(issued[0].send_all);
    assert_eq!(form.proposed_amount.as_ref().unwrap().amount, "0.75000000");

    // Changing the fee target with send-all on refreshes the fiat value.
    form.fee_target_change(FeeTargetCode::High);
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.fiat_amount, "37500.00");
}

#[tokio::test(start_paused = true)]
async fn test_fiat_input_converts_to_coin_amount() {
    let harness = Harness::new();
    let mut form = form(&harness);
    form.on_address_change(ADDRESS);

    form.on_fiat_input("500");
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.amount, "0.01000000");
    assert_eq!(form.fiat_amount, "500");
    assert_eq!(harness.wallet.proposals().len(), 1);

    form.on_fiat_input("lots");
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.errors.amount.as_deref(), Some(INVALID_AMOUNT));

    form.on_fiat_input("");
    assert!(form.amount.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_payment_uri_fills_form() {
    let harness = Harness::new();
    let mut form = form(&harness);
    form.on_send_all_change(true);

    form.parse_qr_result(&format!("bitcoin:{ADDRESS}?amount=0.5"));
    run_for!(form, Duration::from_secs(1));

    assert_eq!(form.recipient_address, ADDRESS);
    assert_eq!(form.amount, "0.50000000");
    assert!(!form.send_all);
    assert_eq!(form.fiat_amount, "25000.00");
    let issued = harness.wallet.proposals();
    assert_eq!(issued.last().unwrap().amount, "0.50000000");
}

#[tokio::test(start_paused = true)]
async fn test_payment_uri_edge_cases() {
    let harness = Harness::new();
    let mut form = form(&harness);

    form.parse_qr_result("https://example.com/pay");
    assert_eq!(form.take_alert().as_deref(), Some(INVALID_FORMAT_ALERT));
    assert!(form.recipient_address.is_empty());

    // A URI without an amount keeps the one already typed.
    form.on_coin_amount_change("0.2");
    run_for!(form, Duration::from_secs(1));
    assert!(harness.wallet.proposals().is_empty());

    form.parse_qr_result(&format!("bitcoin:{ADDRESS}"));
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.recipient_address, ADDRESS);
    assert_eq!(form.amount, "0.2");
    assert_eq!(form.fiat_amount, "10000.00");
    assert_eq!(harness.wallet.proposals().last().unwrap().amount, "0.2");
    assert!(form.can_send());

    form.parse_qr_result("bitcoin:bcrt1qother?amount=abc");
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.recipient_address, "bcrt1qother");
    assert_eq!(form.errors.amount.as_deref(), Some(INVALID_AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_successful_send_clears_form() {
    let harness = Harness::new();
    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.1");
    form.on_note_change("rent");
    run_for!(form, Duration::from_secs(1));
    assert!(form.can_send());

    form.send();
    run_for!(form, Duration::from_millis(100));

    assert_eq!(harness.wallet.connect_calls(), 1);
    assert_eq!(harness.wallet.send_calls(), 1);
    assert_eq!(harness.wallet.notes(), vec!["rent".to_string()]);
    assert!(form.is_sent);
    assert!(!form.is_confirming);
    assert!(form.recipient_address.is_empty());
    assert!(form.amount.is_empty());
    assert!(form.note.is_empty());
    assert!(form.proposed_total.is_none());

    run_for!(form, Duration::from_secs(6));
    assert!(!form.is_sent);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_send_shows_message() {
    let harness = Harness::new();
    harness.wallet.set_send_result(SendResult::Aborted);
    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.1");
    run_for!(form, Duration::from_secs(1));

    form.send();
    run_for!(form, Duration::from_millis(100));
    assert!(form.is_aborted);
    assert_eq!(form.recipient_address, ADDRESS);

    run_for!(form, Duration::from_secs(6));
    assert!(!form.is_aborted);
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_alerts() {
    let harness = Harness::new();
    harness.wallet.set_send_result(SendResult::Failed {
        error_code: Some("erc20InsufficientGasFunds".into()),
        error_message: None,
    });
    let mut form = form(&harness);
    form.send();
    run_for!(form, Duration::from_millis(100));
    assert_eq!(
        form.take_alert().as_deref(),
        Some("Insufficient funds to pay for the gas fee")
    );

    harness.wallet.set_send_result(SendResult::Failed {
        error_code: None,
        error_message: Some("txn-mempool-conflict".into()),
    });
    form.send();
    run_for!(form, Duration::from_millis(100));
    assert_eq!(
        form.take_alert().as_deref(),
        Some("An unknown error occurred: txn-mempool-conflict")
    );
    assert!(!form.is_confirming);
    assert!(form.sign_progress.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unconnected_keystore_stops_send() {
    let harness = Harness::new();
    harness.wallet.set_connect_success(false);
    let mut form = form(&harness);

    form.send();
    run_for!(form, Duration::from_millis(100));

    assert_eq!(harness.wallet.connect_calls(), 1);
    assert_eq!(harness.wallet.send_calls(), 0);
    assert!(form.alert.is_none());
    assert!(!form.is_confirming);
}

#[tokio::test(start_paused = true)]
async fn test_missing_mobile_channel_blocks_send() {
    let harness = Harness::new();
    harness.wallet.attach_bitbox01(false, true);
    let mut form = form(&harness);
    run_for!(form, Duration::from_secs(1));

    assert!(form.no_mobile_channel_error);
    assert!(!form.paired);

    form.send();
    assert_eq!(form.take_alert().as_deref(), Some(PAIRING_ALERT));
    run_for!(form, Duration::from_millis(100));
    assert_eq!(harness.wallet.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_paired_bitbox() {
    let harness = Harness::new();
    harness.wallet.attach_bitbox01(true, true);
    let mut form = form(&harness);
    run_for!(form, Duration::from_secs(1));

    assert!(form.paired);
    assert!(!form.no_mobile_channel_error);
}

#[tokio::test(start_paused = true)]
async fn test_backend_events_update_form() {
    let harness = Harness::new();
    let mut form = form(&harness);
    run_for!(form, Duration::from_secs(1));
    assert_eq!(harness.wallet.balance_calls(), 1);

    let progress = SignProgress { steps: 2, step: 1 };
    harness.backend.events.publish(BackendEvent::SignConfirm);
    run_for!(form, Duration::from_millis(10));
    assert!(form.sign_confirm);

    harness
        .backend
        .events
        .publish(BackendEvent::SignProgress(progress));
    run_for!(form, Duration::from_millis(10));
    assert_eq!(form.sign_progress, Some(progress));
    assert!(!form.sign_confirm);

    harness
        .backend
        .events
        .publish(BackendEvent::SyncDone("some-other-account".into()));
    run_for!(form, Duration::from_millis(10));
    assert_eq!(harness.wallet.balance_calls(), 1);

    harness
        .backend
        .events
        .publish(BackendEvent::SyncDone(rbtc_account().code));
    run_for!(form, Duration::from_millis(10));
    assert_eq!(harness.wallet.balance_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_coin_control_selection() {
    let harness = Harness::new();
    let mut form = form(&harness);
    form.on_address_change(ADDRESS);
    form.on_coin_amount_change("0.1");

    form.toggle_coin_control();
    assert!(!form.should_leave_on_escape());
    run_for!(form, Duration::from_secs(1));
    assert_eq!(form.utxos.len(), 2);

    let outpoint = form.utxos[0].outpoint.clone();
    form.toggle_utxo(&outpoint);
    run_for!(form, Duration::from_secs(1));
    assert_eq!(
        harness.wallet.proposals().last().unwrap().selected_utxos,
        vec![outpoint]
    );

    form.toggle_coin_control();
    assert!(form.selected_utxos.is_empty());
    assert!(form.should_leave_on_escape());
}

#[tokio::test(start_paused = true)]
async fn test_escape_and_currency_unit() {
    let mut harness = Harness::new();
    harness.config.active_currency = "BTC".into();
    harness.config.btc_unit = BtcUnit::Sat;
    let mut form = form(&harness);

    assert_eq!(form.base_currency_unit(), "sat");
    form.fiat_unit = "EUR".into();
    assert_eq!(form.base_currency_unit(), "EUR");

    form.toggle_scan_qr();
    assert!(!form.should_leave_on_escape());
    form.toggle_scan_qr();
    assert!(form.should_leave_on_escape());
}
