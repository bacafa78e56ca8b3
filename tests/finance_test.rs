use papertrade::client::finance::TestClient;
use papertrade::http::finance::{Apology, Client};
use papertrade::ledger::{LedgerError, TradeType, STARTING_CASH};
use papertrade::quote::PriceSource;

fn client() -> TestClient {
    TestClient::single(vec![("ABC", 100.0), ("BCD", 25.0)])
}

fn ledger_error(err: anyhow::Error) -> LedgerError {
    err.downcast::<LedgerError>().unwrap()
}

#[tokio::test]
async fn test_that_trading_round_trip_balances() {
    let mut client = client();
    client.register("alice", "hunter2", "hunter2").await.unwrap();

    client.buy("ABC", "10").await.unwrap();
    client.buy("bcd", "40").await.unwrap();
    client.sell("ABC", "5").await.unwrap();

    let portfolio = client.portfolio().await.unwrap().portfolio;
    assert_eq!(portfolio.username, "alice");
    assert_eq!(portfolio.cash, STARTING_CASH - 1000.0 - 1000.0 + 500.0);
    assert_eq!(portfolio.assets, STARTING_CASH);

    let total: f64 = portfolio.holdings.iter().map(|h| h.value).sum();
    assert_eq!(portfolio.assets, portfolio.cash + total);

    let history = client.history().await.unwrap().transactions;
    let shares: Vec<i64> = history.iter().map(|t| t.shares).collect();
    assert_eq!(shares, vec![10, 40, -5]);
    assert_eq!(history[1].symbol, "BCD");
    assert_eq!(history[2].typ, TradeType::Sell);
}

#[tokio::test]
async fn test_that_failed_buy_changes_nothing() {
    let mut client = client();
    client.register("alice", "pw", "pw").await.unwrap();

    let err = client.buy("ABC", "101").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::InsufficientFunds);

    let err = client.buy("XYZ", "1").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::StockNotFound);

    let err = client.buy("ABC", "ten").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::InvalidShares);

    let err = client.buy("AB1", "1").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::InvalidSymbol);

    let portfolio = client.portfolio().await.unwrap().portfolio;
    assert_eq!(portfolio.cash, STARTING_CASH);
    assert!(portfolio.holdings.is_empty());
    assert!(client.history().await.unwrap().transactions.is_empty());
}

#[tokio::test]
async fn test_that_sell_validates_holdings() {
    let mut client = client();
    client.register("alice", "pw", "pw").await.unwrap();

    let err = client.sell("ABC", "1").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::NotOwned("ABC".to_string()));

    client.buy("ABC", "3").await.unwrap();
    let err = client.sell("ABC", "4").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::NotEnoughShares);

    let err = client.sell("ABC", "0").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::InvalidShares);

    assert_eq!(client.sell_symbols().await.unwrap().symbols, vec!["ABC"]);
    client.sell("ABC", "3").await.unwrap();
    assert!(client.sell_symbols().await.unwrap().symbols.is_empty());
}

#[tokio::test]
async fn test_that_sell_fails_when_price_is_unavailable() {
    let mut client = client();
    client.register("alice", "pw", "pw").await.unwrap();
    client.buy("ABC", "3").await.unwrap();

    if let PriceSource::Fixed(prices) = &client.state().prices {
        prices.remove("ABC");
    }

    let err = client.sell("ABC", "1").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::StockNotFound);

    //Portfolio still values the position at its last known price
    let portfolio = client.portfolio().await.unwrap().portfolio;
    assert_eq!(portfolio.assets, STARTING_CASH);
}

#[tokio::test]
async fn test_that_accounts_are_isolated() {
    let mut alice = client();
    alice.register("alice", "pw", "pw").await.unwrap();
    alice.buy("ABC", "1").await.unwrap();
    alice.logout().await.unwrap();

    alice.register("bob", "pw", "pw").await.unwrap();
    assert!(alice.history().await.unwrap().transactions.is_empty());
    assert_eq!(alice.portfolio().await.unwrap().portfolio.cash, STARTING_CASH);

    alice.login("alice", "pw").await.unwrap();
    assert_eq!(alice.history().await.unwrap().transactions.len(), 1);
}

#[tokio::test]
async fn test_that_registration_and_login_are_checked() {
    let mut client = client();

    let err = client.register("", "pw", "pw").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::EmptyUsername);
    let err = client.register("alice", "", "").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::EmptyPassword);
    let err = client.register("alice", "pw", "wp").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::PasswordMismatch);

    client.register("alice", "pw", "pw").await.unwrap();
    let err = client.register("alice", "pw", "pw").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::UsernameTaken);

    let err = client.login("alice", "wrong").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::InvalidCredentials);
    let err = client.login("", "pw").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::MissingUsername);
    let err = client.login("alice", "").await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::MissingPassword);

    //Failed logins clear the previous session
    let err = client.history().await.unwrap_err();
    assert_eq!(ledger_error(err), LedgerError::LoginRequired);

    client.login("alice", "pw").await.unwrap();
    assert!(client.history().await.is_ok());
}

#[tokio::test]
async fn test_that_quote_returns_price_and_user() {
    let mut client = client();
    client.register("alice", "pw", "pw").await.unwrap();

    let resp = client.quote("bcd").await.unwrap();
    assert_eq!(resp.quote.symbol, "BCD");
    assert_eq!(resp.quote.price, 25.0);
    assert_eq!(resp.price_usd, "$25.00");
    assert_eq!(resp.username, "alice");

    let err = client.quote("nothing").await.unwrap_err();
    let err = ledger_error(err);
    assert_eq!(err, LedgerError::QuoteNotFound);
    assert_eq!(err.to_string(), "Stock is not found");
}

#[test]
fn test_that_apology_displays_message_and_code() {
    let apology = Apology {
        message: "No Stock was Found".to_string(),
        code: 400,
    };
    assert_eq!(apology.to_string(), "No Stock was Found (400)");
}
