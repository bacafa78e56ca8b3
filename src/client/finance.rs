use anyhow::{anyhow, Error, Result};
use reqwest;
use serde::de::DeserializeOwned;

use crate::auth::Token;
use crate::http::finance::{
    Apology, AppState, Client, HistoryResponse, LoginRequest, PortfolioResponse, QuoteRequest,
    QuoteResponse, RegisterRequest, SymbolsResponse, TokenResponse, TradeRequest, TradeResponse,
};
use crate::ledger::{LedgerError, UserId};
use crate::quote::usd;

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if resp.status().is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let status = resp.status();
    match resp.json::<Apology>().await {
        Ok(apology) => Err(Error::new(apology)),
        Err(_) => Err(anyhow!("server returned {status}")),
    }
}

#[derive(Debug)]
pub struct HttpClient {
    pub path: String,
    pub client: reqwest::Client,
    token: Option<Token>,
}

impl HttpClient {
    pub fn new(path: String) -> Self {
        Self {
            path,
            client: reqwest::Client::new(),
            token: None,
        }
    }

    fn get(&self, route: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(self.path.clone() + route))
    }

    fn post(&self, route: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.path.clone() + route))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl Client for HttpClient {
    async fn register(
        &mut self,
        username: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<TokenResponse> {
        let req = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            confirmation: confirmation.to_string(),
        };
        let resp: TokenResponse = read_json(self.post("/register").json(&req).send().await?).await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<TokenResponse> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: TokenResponse = read_json(self.post("/login").json(&req).send().await?).await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    async fn logout(&mut self) -> Result<()> {
        read_json::<()>(self.get("/logout").send().await?).await?;
        self.token = None;
        Ok(())
    }

    async fn quote(&mut self, symbol: &str) -> Result<QuoteResponse> {
        let req = QuoteRequest {
            symbol: symbol.to_string(),
        };
        read_json(self.post("/quote").json(&req).send().await?).await
    }

    async fn buy(&mut self, symbol: &str, shares: &str) -> Result<TradeResponse> {
        let req = TradeRequest {
            symbol: symbol.to_string(),
            shares: shares.to_string(),
        };
        read_json(self.post("/buy").json(&req).send().await?).await
    }

    async fn sell(&mut self, symbol: &str, shares: &str) -> Result<TradeResponse> {
        let req = TradeRequest {
            symbol: symbol.to_string(),
            shares: shares.to_string(),
        };
        read_json(self.post("/sell").json(&req).send().await?).await
    }

    async fn sell_symbols(&mut self) -> Result<SymbolsResponse> {
        read_json(self.get("/sell").send().await?).await
    }

    async fn portfolio(&mut self) -> Result<PortfolioResponse> {
        read_json(self.get("/").send().await?).await
    }

    async fn history(&mut self) -> Result<HistoryResponse> {
        read_json(self.get("/history").send().await?).await
    }
}

/// Calls [AppState] in-process, sessions and validation behave as they do over HTTP.
pub struct TestClient {
    state: AppState,
    token: Option<Token>,
}

impl TestClient {
    pub fn single(prices: Vec<(&str, f64)>) -> Self {
        Self::new(AppState::single(prices))
    }

    pub fn new(state: AppState) -> Self {
        Self { state, token: None }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn user(&self) -> Result<UserId> {
        let token = self
            .token
            .as_ref()
            .ok_or(Error::new(LedgerError::LoginRequired))?;
        Ok(self.state.authenticate(token)?)
    }
}

impl Client for TestClient {
    async fn register(
        &mut self,
        username: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<TokenResponse> {
        if let Some(token) = self.token.take() {
            self.state.logout(&token);
        }
        let (user_id, token) = self
            .state
            .register(username, password, confirmation)
            .await?;
        self.token = Some(token.clone());
        Ok(TokenResponse { user_id, token })
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<TokenResponse> {
        if let Some(token) = self.token.take() {
            self.state.logout(&token);
        }
        let (user_id, token) = self.state.login(username, password).await?;
        self.token = Some(token.clone());
        Ok(TokenResponse { user_id, token })
    }

    async fn logout(&mut self) -> Result<()> {
        if let Some(token) = self.token.take() {
            self.state.logout(&token);
        }
        Ok(())
    }

    async fn quote(&mut self, symbol: &str) -> Result<QuoteResponse> {
        let user_id = self.user()?;
        let (quote, username) = self.state.quote(user_id, symbol).await?;
        Ok(QuoteResponse {
            price_usd: usd(quote.price),
            quote,
            username,
        })
    }

    async fn buy(&mut self, symbol: &str, shares: &str) -> Result<TradeResponse> {
        let user_id = self.user()?;
        let transaction = self.state.buy(user_id, symbol, shares).await?;
        Ok(TradeResponse { transaction })
    }

    async fn sell(&mut self, symbol: &str, shares: &str) -> Result<TradeResponse> {
        let user_id = self.user()?;
        let transaction = self.state.sell(user_id, symbol, shares).await?;
        Ok(TradeResponse { transaction })
    }

    async fn sell_symbols(&mut self) -> Result<SymbolsResponse> {
        let user_id = self.user()?;
        let symbols = self.state.owned_symbols(user_id).await?;
        Ok(SymbolsResponse { symbols })
    }

    async fn portfolio(&mut self) -> Result<PortfolioResponse> {
        let user_id = self.user()?;
        Ok(self.state.portfolio(user_id).await?.into())
    }

    async fn history(&mut self) -> Result<HistoryResponse> {
        let user_id = self.user()?;
        let transactions = self.state.history(user_id).await?;
        Ok(HistoryResponse { transactions })
    }
}
