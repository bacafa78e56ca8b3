use std::collections::HashMap;
use std::future::{ready, Future, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, verify_password, Sessions, Token};
use crate::clock::Clock;
use crate::ledger::{
    parse_shares, validate_registration, validate_symbol, LedgerError, PortfolioSummary,
    Transaction, UserId,
};
use crate::quote::{usd, PriceSource, Quote};
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub prices: PriceSource,
    pub sessions: Sessions,
    pub clock: Clock,
}

impl AppState {
    pub fn new(store: Store, prices: PriceSource) -> Self {
        Self {
            store,
            prices,
            sessions: Sessions::new(),
            clock: Clock::System,
        }
    }

    /// In-memory store with a fixed price table, used by tests and `--memory` runs.
    pub fn single(prices: Vec<(&str, f64)>) -> Self {
        Self::new(Store::memory(), PriceSource::fixed(prices))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn authenticate(&self, token: &str) -> Result<UserId, LedgerError> {
        self.sessions.get(token).ok_or(LedgerError::LoginRequired)
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(UserId, Token), LedgerError> {
        validate_registration(username, password, confirmation)?;

        if self.store.find_user(username).await?.is_some() {
            return Err(LedgerError::UsernameTaken);
        }

        let hash = hash_password(password)?;
        let user_id = self.store.create_user(username, &hash).await?;
        info!("SERVER: registered {username} as {user_id}");
        Ok((user_id, self.sessions.create(user_id)))
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserId, Token), LedgerError> {
        if username.is_empty() {
            return Err(LedgerError::MissingUsername);
        }
        if password.is_empty() {
            return Err(LedgerError::MissingPassword);
        }

        let user = self
            .store
            .find_user(username)
            .await?
            .ok_or(LedgerError::InvalidCredentials)?;

        if !verify_password(password, &user.hash)? {
            return Err(LedgerError::InvalidCredentials);
        }
        Ok((user.id, self.sessions.create(user.id)))
    }

    pub fn logout(&self, token: &str) {
        self.sessions.clear(token);
    }

    pub async fn quote(&self, user_id: UserId, symbol: &str) -> Result<(Quote, String), LedgerError> {
        let symbol = validate_symbol(symbol).map_err(|_| LedgerError::QuoteNotFound)?;
        let quote = self
            .prices
            .lookup(&symbol)
            .await
            .ok_or(LedgerError::QuoteNotFound)?;
        let account = self.store.load_account(user_id).await?;
        Ok((quote, account.username))
    }

    pub async fn buy(
        &self,
        user_id: UserId,
        symbol: &str,
        shares: &str,
    ) -> Result<Transaction, LedgerError> {
        let shares = parse_shares(shares)?;
        let symbol = validate_symbol(symbol)?;
        let quote = self
            .prices
            .lookup(&symbol)
            .await
            .ok_or(LedgerError::StockNotFound)?;

        let time = self.clock.stamp();
        let transaction = self
            .store
            .update_account(user_id, |account| {
                account.buy(&symbol, shares, quote.price, time)
            })
            .await?;
        info!(
            "SERVER: {user_id} bought {shares} {symbol} for {}",
            usd(transaction.cost)
        );
        Ok(transaction)
    }

    pub async fn sell(
        &self,
        user_id: UserId,
        symbol: &str,
        shares: &str,
    ) -> Result<Transaction, LedgerError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(LedgerError::InvalidSymbol);
        }

        let account = self.store.load_account(user_id).await?;
        if !account.holdings.contains_key(&symbol) {
            return Err(LedgerError::NotOwned(symbol));
        }

        let quote = self
            .prices
            .lookup(&symbol)
            .await
            .ok_or(LedgerError::StockNotFound)?;
        let shares = parse_shares(shares)?;

        let time = self.clock.stamp();
        let transaction = self
            .store
            .update_account(user_id, |account| {
                account.sell(&symbol, shares, quote.price, time)
            })
            .await?;
        info!(
            "SERVER: {user_id} sold {shares} {symbol} for {}",
            usd(transaction.cost)
        );
        Ok(transaction)
    }

    pub async fn owned_symbols(&self, user_id: UserId) -> Result<Vec<String>, LedgerError> {
        Ok(self.store.load_account(user_id).await?.symbols())
    }

    /// Revalues every holding at the latest price and persists the new asset total.
    pub async fn portfolio(&self, user_id: UserId) -> Result<PortfolioSummary, LedgerError> {
        let account = self.store.load_account(user_id).await?;
        //Lookups happen before the account is locked, they go over the network
        let prices: HashMap<String, f64> = self.prices.prices(&account.symbols()).await;

        self.store
            .update_account(user_id, |account| Ok(account.reconcile(&prices)))
            .await
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        self.store.transactions(user_id).await
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Apology {
    pub message: String,
    pub code: u16,
}

impl std::error::Error for Apology {}

impl core::fmt::Display for Apology {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl actix_web::ResponseError for LedgerError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            LedgerError::MissingUsername
            | LedgerError::MissingPassword
            | LedgerError::InvalidCredentials => StatusCode::FORBIDDEN,
            LedgerError::LoginRequired | LedgerError::UnknownUser => StatusCode::UNAUTHORIZED,
            LedgerError::Hashing | LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        //Storage errors are logged where they occur, callers only need to know it failed
        let message = match self {
            LedgerError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(status).json(Apology {
            message,
            code: status.as_u16(),
        })
    }
}

fn bearer(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// Extractor for handlers that need a logged in user.
#[derive(Debug)]
pub struct Authenticated {
    pub user_id: UserId,
    pub token: Token,
}

impl FromRequest for Authenticated {
    type Error = LedgerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let res = match (req.app_data::<web::Data<AppState>>(), bearer(req)) {
            (Some(app), Some(token)) => app
                .authenticate(&token)
                .map(|user_id| Authenticated { user_id, token }),
            _ => Err(LedgerError::LoginRequired),
        };
        ready(res)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmation: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub user_id: UserId,
    pub token: Token,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuoteResponse {
    pub quote: Quote,
    pub price_usd: String,
    pub username: String,
}

/// Share counts are passed as text, exactly as typed into the trade form, and validated on the
/// server.
#[derive(Debug, Deserialize, Serialize)]
pub struct TradeRequest {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub shares: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TradeResponse {
    pub transaction: Transaction,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PortfolioResponse {
    pub portfolio: PortfolioSummary,
    pub cash_usd: String,
    pub assets_usd: String,
}

impl From<PortfolioSummary> for PortfolioResponse {
    fn from(value: PortfolioSummary) -> Self {
        Self {
            cash_usd: usd(value.cash),
            assets_usd: usd(value.assets),
            portfolio: value,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<Transaction>,
}

pub trait Client {
    fn register(
        &mut self,
        username: &str,
        password: &str,
        confirmation: &str,
    ) -> impl Future<Output = Result<TokenResponse>>;
    fn login(&mut self, username: &str, password: &str) -> impl Future<Output = Result<TokenResponse>>;
    fn logout(&mut self) -> impl Future<Output = Result<()>>;
    fn quote(&mut self, symbol: &str) -> impl Future<Output = Result<QuoteResponse>>;
    fn buy(&mut self, symbol: &str, shares: &str) -> impl Future<Output = Result<TradeResponse>>;
    fn sell(&mut self, symbol: &str, shares: &str) -> impl Future<Output = Result<TradeResponse>>;
    fn sell_symbols(&mut self) -> impl Future<Output = Result<SymbolsResponse>>;
    fn portfolio(&mut self) -> impl Future<Output = Result<PortfolioResponse>>;
    fn history(&mut self) -> impl Future<Output = Result<HistoryResponse>>;
}

pub mod server {
    use actix_web::error::{InternalError, JsonPayloadError};
    use actix_web::middleware::DefaultHeaders;
    use actix_web::{get, post, web, HttpRequest, HttpResponse};

    use super::{
        bearer, Apology, AppState, Authenticated, HistoryResponse, LoginRequest, PortfolioResponse,
        QuoteRequest, QuoteResponse, RegisterRequest, SymbolsResponse, TokenResponse,
        TradeRequest, TradeResponse,
    };
    use crate::ledger::LedgerError;
    use crate::quote::usd;

    /// Responses hold balances that change on every trade and must never be served from a cache.
    pub fn no_cache() -> DefaultHeaders {
        DefaultHeaders::new()
            .add(("Cache-Control", "no-cache, no-store, must-revalidate"))
            .add(("Expires", "0"))
            .add(("Pragma", "no-cache"))
    }

    /// Bodies that fail to deserialize are answered with an [Apology] like every other error.
    pub fn json_config() -> web::JsonConfig {
        web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            let apology = Apology {
                message: err.to_string(),
                code: 400,
            };
            InternalError::from_response(err, HttpResponse::BadRequest().json(apology)).into()
        })
    }

    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.app_data(json_config())
            .service(index)
            .service(register)
            .service(login)
            .service(logout)
            .service(quote)
            .service(buy)
            .service(sell_symbols)
            .service(sell)
            .service(history);
    }

    #[get("/")]
    pub async fn index(
        app: web::Data<AppState>,
        auth: Authenticated,
    ) -> Result<web::Json<PortfolioResponse>, LedgerError> {
        let summary = app.portfolio(auth.user_id).await?;
        Ok(web::Json(summary.into()))
    }

    #[post("/register")]
    pub async fn register(
        app: web::Data<AppState>,
        req: HttpRequest,
        body: web::Json<RegisterRequest>,
    ) -> Result<web::Json<TokenResponse>, LedgerError> {
        if let Some(token) = bearer(&req) {
            app.logout(&token);
        }

        let (user_id, token) = app
            .register(&body.username, &body.password, &body.confirmation)
            .await?;
        Ok(web::Json(TokenResponse { user_id, token }))
    }

    #[post("/login")]
    pub async fn login(
        app: web::Data<AppState>,
        req: HttpRequest,
        body: web::Json<LoginRequest>,
    ) -> Result<web::Json<TokenResponse>, LedgerError> {
        if let Some(token) = bearer(&req) {
            app.logout(&token);
        }

        let (user_id, token) = app.login(&body.username, &body.password).await?;
        Ok(web::Json(TokenResponse { user_id, token }))
    }

    #[get("/logout")]
    pub async fn logout(app: web::Data<AppState>, req: HttpRequest) -> web::Json<()> {
        if let Some(token) = bearer(&req) {
            app.logout(&token);
        }
        web::Json(())
    }

    #[post("/quote")]
    pub async fn quote(
        app: web::Data<AppState>,
        auth: Authenticated,
        body: web::Json<QuoteRequest>,
    ) -> Result<web::Json<QuoteResponse>, LedgerError> {
        let (quote, username) = app.quote(auth.user_id, &body.symbol).await?;
        Ok(web::Json(QuoteResponse {
            price_usd: usd(quote.price),
            quote,
            username,
        }))
    }

    #[post("/buy")]
    pub async fn buy(
        app: web::Data<AppState>,
        auth: Authenticated,
        body: web::Json<TradeRequest>,
    ) -> Result<web::Json<TradeResponse>, LedgerError> {
        let transaction = app.buy(auth.user_id, &body.symbol, &body.shares).await?;
        Ok(web::Json(TradeResponse { transaction }))
    }

    #[get("/sell")]
    pub async fn sell_symbols(
        app: web::Data<AppState>,
        auth: Authenticated,
    ) -> Result<web::Json<SymbolsResponse>, LedgerError> {
        let symbols = app.owned_symbols(auth.user_id).await?;
        Ok(web::Json(SymbolsResponse { symbols }))
    }

    #[post("/sell")]
    pub async fn sell(
        app: web::Data<AppState>,
        auth: Authenticated,
        body: web::Json<TradeRequest>,
    ) -> Result<web::Json<TradeResponse>, LedgerError> {
        let transaction = app.sell(auth.user_id, &body.symbol, &body.shares).await?;
        Ok(web::Json(TradeResponse { transaction }))
    }

    #[get("/history")]
    pub async fn history(
        app: web::Data<AppState>,
        auth: Authenticated,
    ) -> Result<web::Json<HistoryResponse>, LedgerError> {
        let transactions = app.history(auth.user_id).await?;
        Ok(web::Json(HistoryResponse { transactions }))
    }
}
