//! Price lookups. Quotes come either from IEX Cloud or from a fixed table that is used for tests
//! and for running the server without an API key.
use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, warn};
use rand::thread_rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

pub const IEX_BASE_URL: &str = "https://cloud.iexapis.com/stable";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Quote {
    pub name: String,
    pub price: f64,
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
struct IexQuote {
    #[serde(rename = "companyName")]
    company_name: String,
    #[serde(rename = "latestPrice")]
    latest_price: f64,
    symbol: String,
}

impl From<IexQuote> for Quote {
    fn from(value: IexQuote) -> Self {
        Self {
            name: value.company_name,
            price: value.latest_price,
            symbol: value.symbol,
        }
    }
}

#[derive(Debug)]
pub struct Iex {
    base: String,
    api_key: String,
    client: reqwest::Client,
}

impl Iex {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base(IEX_BASE_URL, api_key)
    }

    pub fn with_base(base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, symbol: &str) -> anyhow::Result<Quote> {
        let url = format!("{}/stock/{}/quote", self.base, symbol);
        let quote = self
            .client
            .get(url)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<IexQuote>()
            .await?;
        Ok(quote.into())
    }

    pub async fn lookup(&self, symbol: &str) -> Option<Quote> {
        //Anything that isn't a plain ticker can't be placed in the path safely and IEX doesn't
        //list it anyway
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        match self.fetch(symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!("QUOTE: lookup of {symbol} failed: {e}");
                None
            }
        }
    }
}

/// In-memory price table. Prices can be moved while the server is running so tests can check
/// revaluation.
#[derive(Debug, Default)]
pub struct Fixed {
    inner: RwLock<HashMap<String, Quote>>,
}

impl Fixed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn random(symbols: Vec<&str>) -> Self {
        let price_dist = Uniform::new(90.0, 100.0);
        let mut rng = thread_rng();

        let source = Self::new();
        for symbol in symbols {
            let random_price = price_dist.sample(&mut rng);
            source.set_price(symbol, random_price);
        }
        source
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let symbol = symbol.to_uppercase();
        let mut inner = self.inner.write().unwrap();
        inner.insert(
            symbol.clone(),
            Quote {
                name: symbol.clone(),
                price,
                symbol,
            },
        );
    }

    pub fn remove(&self, symbol: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.remove(&symbol.to_uppercase());
    }

    pub fn lookup(&self, symbol: &str) -> Option<Quote> {
        let inner = self.inner.read().unwrap();
        inner.get(&symbol.to_uppercase()).cloned()
    }
}

#[derive(Debug)]
pub enum PriceSource {
    Iex(Iex),
    Fixed(Fixed),
}

impl PriceSource {
    pub fn iex(api_key: impl Into<String>) -> Self {
        PriceSource::Iex(Iex::new(api_key))
    }

    pub fn fixed(prices: Vec<(&str, f64)>) -> Self {
        let source = Fixed::new();
        for (symbol, price) in prices {
            source.set_price(symbol, price);
        }
        PriceSource::Fixed(source)
    }

    /// Returns `None` for unknown symbols and for any failure to reach the source.
    pub async fn lookup(&self, symbol: &str) -> Option<Quote> {
        debug!("QUOTE: looking up {symbol}");
        match self {
            PriceSource::Iex(iex) => iex.lookup(symbol).await,
            PriceSource::Fixed(fixed) => fixed.lookup(symbol),
        }
    }

    /// Prices for every symbol that could be looked up. Missing symbols are left out.
    pub async fn prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut res = HashMap::new();
        for symbol in symbols {
            if let Some(quote) = self.lookup(symbol).await {
                res.insert(symbol.clone(), quote.price);
            }
        }
        res
    }
}

/// Formats a cash amount as dollars, `$1,234.56`.
pub fn usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, c) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}
