//! Summary screen and navigation between screens.

use std::time::Duration;

use bitsend_core::CoinCode;
use bitsend_tests::{Harness, invoice, run_for};
use bitsend_tui::App;
use bitsend_tui::app::{SendField, UiMode};
use bitsend_tui::SendStep;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        app.handle_key(key(KeyCode::Char(c)));
    }
}

async fn app(harness: &Harness) -> App {
    let mut app = App::new(harness.config.clone(), harness.backend.clone());
    app.init().await;
    app
}

#[tokio::test(start_paused = true)]
async fn test_summary_lists_bitcoin_for_lightning() {
    let harness = Harness::new();
    let app = app(&harness).await;

    assert_eq!(app.accounts.len(), 1);
    assert_eq!(app.coin_rows.len(), 2);
    assert_eq!(app.coin_rows[0].coin_code, CoinCode::Rbtc);
    assert_eq!(
        app.coin_rows[0].balance.as_ref().unwrap().amount,
        "0.75000000"
    );
    assert_eq!(app.coin_rows[1].coin_code, CoinCode::Btc);
    assert!(app.coin_rows[1].balance.is_none());
    assert_eq!(app.fiat_total.as_deref(), Some("37500.00 USD"));
}

#[tokio::test(start_paused = true)]
async fn test_summary_without_lightning() {
    let mut harness = Harness::new();
    harness.backend.lightning = None;
    let mut app = app(&harness).await;

    assert_eq!(app.coin_rows.len(), 1);

    app.handle_key(key(KeyCode::Char('l')));
    assert_eq!(app.ui_mode, UiMode::Summary);
    assert_eq!(
        app.status_message.as_deref(),
        Some("Lightning is not configured")
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_fiat_total_in_btc_mode() {
    let mut harness = Harness::new();
    harness.config.active_currency = "BTC".into();
    let app = app(&harness).await;

    assert!(app.fiat_total.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_typing_into_send_form() {
    let harness = Harness::new();
    let mut app = app(&harness).await;

    app.handle_key(key(KeyCode::Enter));
    assert_eq!(app.ui_mode, UiMode::Send);
    assert_eq!(app.send_field, SendField::Address);

    type_text(&mut app, "bcrt1qdest");
    app.handle_key(key(KeyCode::Tab));
    type_text(&mut app, "0.2");

    run_for!(app.send.as_mut().unwrap(), Duration::from_secs(1));
    let form = app.send.as_ref().unwrap();
    assert_eq!(form.recipient_address, "bcrt1qdest");
    assert_eq!(form.amount, "0.2");
    assert!(form.can_send());

    // Keystrokes are debounced into a single proposal.
    assert_eq!(harness.wallet.proposals().len(), 1);

    app.handle_key(key(KeyCode::Esc));
    assert_eq!(app.ui_mode, UiMode::Summary);
    assert!(app.send.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_alert_swallows_keys_until_dismissed() {
    let harness = Harness::new();
    let mut app = app(&harness).await;
    app.handle_key(key(KeyCode::Enter));

    app.handle_key(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::CONTROL));
    type_text(&mut app, "ftp://nope");
    app.handle_key(key(KeyCode::Enter));
    assert!(app.send.as_ref().unwrap().alert.is_some());

    app.handle_key(key(KeyCode::Esc));
    assert!(app.send.as_ref().unwrap().alert.is_none());
    assert_eq!(app.ui_mode, UiMode::Send);
}

#[tokio::test(start_paused = true)]
async fn test_lightning_round_trip() {
    let harness = Harness::new();
    harness
        .lightning
        .script_input("lnbcrt1", Ok(invoice("lnbcrt1", Some(21_000), None)));
    let mut app = app(&harness).await;

    app.handle_key(key(KeyCode::Char('l')));
    assert_eq!(app.ui_mode, UiMode::LightningSend);

    app.insert_text(" lnbcrt1 \n");
    app.handle_key(key(KeyCode::Enter));
    run_for!(app.lightning.as_mut().unwrap(), Duration::from_millis(100));
    assert_eq!(app.lightning.as_ref().unwrap().step, SendStep::Confirm);

    app.handle_key(key(KeyCode::Esc));
    assert_eq!(app.lightning.as_ref().unwrap().step, SendStep::SelectInvoice);

    app.handle_key(key(KeyCode::Esc));
    assert_eq!(app.ui_mode, UiMode::Summary);
    assert!(app.lightning.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_success_screen_closes_itself() {
    let harness = Harness::new();
    harness
        .lightning
        .script_input("lnbcrt1", Ok(invoice("lnbcrt1", Some(21_000), None)));
    let mut app = app(&harness).await;

    app.handle_key(key(KeyCode::Char('l')));
    app.insert_text("lnbcrt1");
    app.handle_key(key(KeyCode::Enter));
    run_for!(app.lightning.as_mut().unwrap(), Duration::from_millis(100));
    app.handle_key(key(KeyCode::Enter));
    run_for!(app.lightning.as_mut().unwrap(), Duration::from_secs(6));

    app.process_screens();
    assert_eq!(app.ui_mode, UiMode::Summary);
    assert_eq!(harness.wallet.balance_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quit() {
    let harness = Harness::new();
    let mut app = app(&harness).await;

    app.handle_key(key(KeyCode::Down));
    assert_eq!(app.selected_account, 0);
    app.handle_key(key(KeyCode::Char('q')));
    assert!(!app.running);
}
