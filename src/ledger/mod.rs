//! Bookkeeping for a single account.
//!
//! Every operation works on an [Account] snapshot that the store has loaded. Operations either
//! leave the snapshot untouched and return an error, or mutate it and queue the transaction rows
//! that have to be written. The store decides whether to persist the result, so the accounting
//! here never touches the database and can be tested directly.
use std::collections::{BTreeMap, HashMap};

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Cash every new account starts with.
pub const STARTING_CASH: f64 = 10_000.00;

#[derive(Clone, Copy, Debug, Display, Deserialize, Serialize, PartialEq, Eq)]
pub enum TradeType {
    #[display("BUY")]
    #[serde(rename = "BUY")]
    Buy,
    #[display("SELL")]
    #[serde(rename = "SELL")]
    Sell,
}

impl TradeType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUY" => Some(TradeType::Buy),
            "SELL" => Some(TradeType::Sell),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
    pub share_price: f64,
    pub value: f64,
}

impl Holding {
    fn revalue(&mut self, price: f64) {
        self.share_price = price;
        self.value = price * self.shares as f64;
    }
}

/// A row of trading history. Sells carry negative `shares`, `cost` is always the absolute cash
/// amount that moved.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Transaction {
    pub user_id: UserId,
    pub symbol: String,
    pub shares: i64,
    pub typ: TradeType,
    pub share_price: f64,
    pub cost: f64,
    pub time: String,
}

#[derive(Clone, Debug)]
pub struct Account {
    pub user_id: UserId,
    pub username: String,
    pub cash: f64,
    pub assets: f64,
    pub holdings: BTreeMap<String, Holding>,
    //Rows created since the account was loaded, drained by the store on write
    pub pending: Vec<Transaction>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PortfolioSummary {
    pub username: String,
    pub cash: f64,
    pub assets: f64,
    pub holdings: Vec<Holding>,
}

impl Account {
    pub fn new(user_id: UserId, username: impl Into<String>, cash: f64) -> Self {
        Self {
            user_id,
            username: username.into(),
            cash,
            assets: cash,
            holdings: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings.keys().cloned().collect()
    }

    pub fn shares_of(&self, symbol: &str) -> i64 {
        self.holdings.get(symbol).map(|h| h.shares).unwrap_or(0)
    }

    pub fn buy(
        &mut self,
        symbol: &str,
        shares: i64,
        price: f64,
        time: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        if shares <= 0 {
            return Err(LedgerError::InvalidShares);
        }

        let value = price * shares as f64;
        if value > self.cash {
            return Err(LedgerError::InsufficientFunds);
        }

        let transaction = Transaction {
            user_id: self.user_id,
            symbol: symbol.to_string(),
            shares,
            typ: TradeType::Buy,
            share_price: price,
            cost: value,
            time: time.into(),
        };

        self.cash -= value;
        self.holdings
            .entry(symbol.to_string())
            .and_modify(|holding| {
                holding.shares += shares;
                holding.revalue(price);
            })
            .or_insert_with(|| Holding {
                symbol: symbol.to_string(),
                shares,
                share_price: price,
                value,
            });

        self.pending.push(transaction.clone());
        Ok(transaction)
    }

    pub fn sell(
        &mut self,
        symbol: &str,
        shares: i64,
        price: f64,
        time: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        let owned = match self.holdings.get(symbol) {
            Some(holding) => holding.shares,
            None => return Err(LedgerError::NotOwned(symbol.to_string())),
        };

        if shares <= 0 {
            return Err(LedgerError::InvalidShares);
        }
        if shares > owned {
            return Err(LedgerError::NotEnoughShares);
        }

        let cost = price * shares as f64;
        let transaction = Transaction {
            user_id: self.user_id,
            symbol: symbol.to_string(),
            shares: -shares,
            typ: TradeType::Sell,
            share_price: price,
            cost,
            time: time.into(),
        };

        let remaining = owned - shares;
        if remaining == 0 {
            self.holdings.remove(symbol);
        } else if let Some(holding) = self.holdings.get_mut(symbol) {
            holding.shares = remaining;
            holding.revalue(price);
        }
        self.cash += cost;

        self.pending.push(transaction.clone());
        Ok(transaction)
    }

    /// Revalues holdings at `prices` and recomputes assets.
    ///
    /// Holdings without a price keep their last known price so that a single failed lookup does
    /// not wipe a position's value out of the total.
    pub fn reconcile(&mut self, prices: &HashMap<String, f64>) -> PortfolioSummary {
        self.holdings.retain(|_, holding| holding.shares != 0);

        for (symbol, holding) in self.holdings.iter_mut() {
            if let Some(price) = prices.get(symbol) {
                holding.revalue(*price);
            }
        }

        let total_stock_value: f64 = self.holdings.values().map(|h| h.value).sum();
        self.assets = self.cash + total_stock_value;
        self.summary()
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            username: self.username.clone(),
            cash: self.cash,
            assets: self.assets,
            holdings: self.holdings.values().cloned().collect(),
        }
    }
}

/// Parses a share count as typed into a form: digits only, strictly positive.
pub fn parse_shares(raw: &str) -> Result<i64, LedgerError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::InvalidShares);
    }
    match raw.parse::<i64>() {
        Ok(shares) if shares > 0 => Ok(shares),
        _ => Err(LedgerError::InvalidShares),
    }
}

/// Symbols are alphabetic tickers. They are stored upper case so that `aapl` and `AAPL` end up in
/// the same holding.
pub fn validate_symbol(raw: &str) -> Result<String, LedgerError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_alphabetic()) {
        return Err(LedgerError::InvalidSymbol);
    }
    Ok(raw.to_uppercase())
}

pub fn validate_registration(
    username: &str,
    password: &str,
    confirmation: &str,
) -> Result<(), LedgerError> {
    if username.is_empty() {
        return Err(LedgerError::EmptyUsername);
    }
    if password.is_empty() {
        return Err(LedgerError::EmptyPassword);
    }
    if confirmation != password {
        return Err(LedgerError::PasswordMismatch);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    InvalidShares,
    InvalidSymbol,
    StockNotFound,
    QuoteNotFound,
    InsufficientFunds,
    NotOwned(String),
    NotEnoughShares,
    EmptyUsername,
    EmptyPassword,
    PasswordMismatch,
    UsernameTaken,
    MissingUsername,
    MissingPassword,
    InvalidCredentials,
    LoginRequired,
    UnknownUser,
    Hashing,
    Storage(String),
}

impl std::error::Error for LedgerError {}

impl core::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LedgerError::InvalidShares => {
                write!(f, "You did not return a valid number of shares")
            }
            LedgerError::InvalidSymbol => write!(f, "You did not enter a valid stock"),
            LedgerError::StockNotFound => write!(f, "No Stock was Found"),
            LedgerError::QuoteNotFound => write!(f, "Stock is not found"),
            LedgerError::InsufficientFunds => write!(f, "Insufficient funds to make purchase"),
            LedgerError::NotOwned(symbol) => write!(f, "You do not own any shares of {symbol}"),
            LedgerError::NotEnoughShares => write!(f, "You do not own that number of shares"),
            LedgerError::EmptyUsername => write!(f, "Username field is empty!"),
            LedgerError::EmptyPassword => write!(f, "Password field is empty!"),
            LedgerError::PasswordMismatch => write!(f, "Password does not match!"),
            LedgerError::UsernameTaken => write!(f, "Username is already taken"),
            LedgerError::MissingUsername => write!(f, "must provide username"),
            LedgerError::MissingPassword => write!(f, "must provide password"),
            LedgerError::InvalidCredentials => write!(f, "invalid username and/or password"),
            LedgerError::LoginRequired => write!(f, "login required"),
            LedgerError::UnknownUser => write!(f, "unknown user"),
            LedgerError::Hashing => write!(f, "failed to process password"),
            LedgerError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{
        parse_shares, validate_registration, validate_symbol, Account, Holding, LedgerError,
        TradeType, STARTING_CASH,
    };

    const NOW: &str = "09:00:00 AM 01/03/2023";

    fn account() -> Account {
        Account::new(1, "alice", STARTING_CASH)
    }

    #[test]
    fn test_that_buy_debits_price_times_shares() {
        let mut acc = account();
        let txn = acc.buy("ABC", 10, 100.0, NOW).unwrap();

        assert_eq!(txn.typ, TradeType::Buy);
        assert_eq!(txn.shares, 10);
        assert_eq!(txn.cost, 1000.0);
        assert_eq!(acc.cash, 9000.0);
        assert_eq!(acc.shares_of("ABC"), 10);
        assert_eq!(acc.pending.len(), 1);
    }

    #[test]
    fn test_that_buy_without_funds_leaves_account_untouched() {
        let mut acc = account();
        let res = acc.buy("ABC", 101, 100.0, NOW);

        assert_eq!(res, Err(LedgerError::InsufficientFunds));
        assert_eq!(acc.cash, STARTING_CASH);
        assert!(acc.holdings.is_empty());
        assert!(acc.pending.is_empty());
    }

    #[test]
    fn test_that_buy_spending_exact_cash_is_allowed() {
        let mut acc = account();
        acc.buy("ABC", 100, 100.0, NOW).unwrap();
        assert_eq!(acc.cash, 0.0);
    }

    #[test]
    fn test_that_repeated_buys_accumulate_and_revalue_holding() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        acc.buy("ABC", 5, 110.0, NOW).unwrap();

        let holding = acc.holdings.get("ABC").unwrap();
        assert_eq!(holding.shares, 15);
        assert_eq!(holding.share_price, 110.0);
        assert_eq!(holding.value, 1650.0);
        assert_eq!(acc.cash, STARTING_CASH - 1000.0 - 550.0);
    }

    #[test]
    fn test_that_sell_credits_cash_and_records_negative_shares() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        let txn = acc.sell("ABC", 4, 120.0, NOW).unwrap();

        assert_eq!(txn.typ, TradeType::Sell);
        assert_eq!(txn.shares, -4);
        assert_eq!(txn.cost, 480.0);
        assert_eq!(acc.cash, 9000.0 + 480.0);
        assert_eq!(acc.shares_of("ABC"), 6);
    }

    #[test]
    fn test_that_selling_whole_position_removes_holding() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        acc.sell("ABC", 10, 100.0, NOW).unwrap();

        assert!(acc.holdings.is_empty());
        assert_eq!(acc.cash, STARTING_CASH);
    }

    #[test]
    fn test_that_sell_rejects_bad_requests() {
        let mut acc = account();
        assert_eq!(
            acc.sell("ABC", 1, 100.0, NOW),
            Err(LedgerError::NotOwned("ABC".to_string()))
        );

        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        assert_eq!(acc.sell("ABC", 0, 100.0, NOW), Err(LedgerError::InvalidShares));
        assert_eq!(acc.sell("ABC", 11, 100.0, NOW), Err(LedgerError::NotEnoughShares));
        assert_eq!(acc.shares_of("ABC"), 10);
        assert_eq!(acc.pending.len(), 1);
    }

    #[test]
    fn test_that_reconcile_totals_cash_and_holdings() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        acc.buy("BCD", 20, 50.0, NOW).unwrap();

        let mut prices = HashMap::new();
        prices.insert("ABC".to_string(), 150.0);
        prices.insert("BCD".to_string(), 40.0);

        let summary = acc.reconcile(&prices);
        assert_eq!(summary.cash, 8000.0);
        assert_eq!(summary.assets, 8000.0 + 1500.0 + 800.0);
        for holding in &summary.holdings {
            assert_eq!(holding.value, holding.share_price * holding.shares as f64);
        }
    }

    #[test]
    fn test_that_reconcile_keeps_last_price_when_lookup_missing() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();

        let summary = acc.reconcile(&HashMap::new());
        assert_eq!(summary.assets, STARTING_CASH);
        assert_eq!(summary.holdings.first().unwrap().share_price, 100.0);
    }

    #[test]
    fn test_that_reconcile_drops_empty_holdings() {
        let mut acc = account();
        acc.buy("ABC", 10, 100.0, NOW).unwrap();
        //Rows like this only come from data written before sells removed empty positions
        acc.holdings.insert(
            "BCD".to_string(),
            Holding {
                symbol: "BCD".to_string(),
                shares: 0,
                share_price: 50.0,
                value: 500.0,
            },
        );

        let mut prices = HashMap::new();
        prices.insert("ABC".to_string(), 100.0);
        prices.insert("BCD".to_string(), 50.0);

        let summary = acc.reconcile(&prices);
        assert!(!acc.holdings.contains_key("BCD"));
        assert_eq!(summary.holdings.len(), 1);
        assert_eq!(summary.assets, STARTING_CASH);
    }

    #[test]
    fn test_that_share_input_must_be_positive_digits() {
        assert_eq!(parse_shares("5"), Ok(5));
        assert_eq!(parse_shares(" 12 "), Ok(12));
        assert_eq!(parse_shares("0"), Err(LedgerError::InvalidShares));
        assert_eq!(parse_shares("-3"), Err(LedgerError::InvalidShares));
        assert_eq!(parse_shares("1.5"), Err(LedgerError::InvalidShares));
        assert_eq!(parse_shares("abc"), Err(LedgerError::InvalidShares));
        assert_eq!(parse_shares(""), Err(LedgerError::InvalidShares));
    }

    #[test]
    fn test_that_symbols_are_alphabetic_and_upper_cased() {
        assert_eq!(validate_symbol("aapl"), Ok("AAPL".to_string()));
        assert_eq!(validate_symbol("BRK.B"), Err(LedgerError::InvalidSymbol));
        assert_eq!(validate_symbol(""), Err(LedgerError::InvalidSymbol));
    }

    #[test]
    fn test_that_registration_checks_fields_in_order() {
        assert_eq!(validate_registration("", "", ""), Err(LedgerError::EmptyUsername));
        assert_eq!(validate_registration("a", "", ""), Err(LedgerError::EmptyPassword));
        assert_eq!(
            validate_registration("a", "pw", "wp"),
            Err(LedgerError::PasswordMismatch)
        );
        assert!(validate_registration("a", "pw", "pw").is_ok());
    }

    #[test]
    fn test_that_trade_type_uses_history_labels() {
        assert_eq!(TradeType::Buy.to_string(), "BUY");
        assert_eq!(TradeType::parse("SELL"), Some(TradeType::Sell));
        assert_eq!(TradeType::parse("HOLD"), None);
    }
}
