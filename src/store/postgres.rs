use std::collections::BTreeMap;

use anyhow::Result;
use deadpool_postgres::{Config, Pool, PoolError, Runtime};
use log::{error, info};
use tokio_postgres::{NoTls, Row};

use crate::ledger::{Account, Holding, LedgerError, TradeType, Transaction, UserId};

use super::UserRecord;

const SCHEMA: &str = include_str!("schema.sql");

impl From<tokio_postgres::Error> for LedgerError {
    fn from(value: tokio_postgres::Error) -> Self {
        error!("STORE: query failed: {value}");
        LedgerError::Storage(value.to_string())
    }
}

impl From<PoolError> for LedgerError {
    fn from(value: PoolError) -> Self {
        error!("STORE: could not get connection: {value}");
        LedgerError::Storage(value.to_string())
    }
}

pub struct PostgresStore {
    pool: Pool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

fn holding_from_row(row: &Row) -> Result<Holding, LedgerError> {
    Ok(Holding {
        symbol: row.try_get("stock")?,
        shares: row.try_get("shares")?,
        share_price: row.try_get("share_price")?,
        value: row.try_get("value")?,
    })
}

fn transaction_from_row(row: &Row) -> Result<Transaction, LedgerError> {
    let typ: String = row.try_get("type")?;
    Ok(Transaction {
        user_id: row.try_get("user_id")?,
        symbol: row.try_get("stock")?,
        shares: row.try_get("shares")?,
        typ: TradeType::parse(&typ)
            .ok_or_else(|| LedgerError::Storage(format!("unknown transaction type {typ}")))?,
        share_price: row.try_get("share_price_time")?,
        cost: row.try_get("cost")?,
        time: row.try_get("time")?,
    })
}

async fn read_account(
    txn: &tokio_postgres::Transaction<'_>,
    user_id: UserId,
    for_update: bool,
) -> Result<Account, LedgerError> {
    let query = if for_update {
        "SELECT id, username, cash, assets FROM users WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, username, cash, assets FROM users WHERE id = $1"
    };

    let user = txn
        .query_opt(query, &[&user_id])
        .await?
        .ok_or(LedgerError::UnknownUser)?;

    let username: String = user.try_get("username")?;
    let cash: f64 = user.try_get("cash")?;
    let mut account = Account::new(user_id, username, cash);
    account.assets = user.try_get("assets")?;

    let rows = txn
        .query(
            "SELECT stock, shares, share_price, value FROM portfolio WHERE user_id = $1 ORDER BY stock_id",
            &[&user_id],
        )
        .await?;

    let mut holdings = BTreeMap::new();
    for row in rows {
        let holding = holding_from_row(&row)?;
        holdings.insert(holding.symbol.clone(), holding);
    }
    account.holdings = holdings;
    Ok(account)
}

async fn write_account(
    txn: &tokio_postgres::Transaction<'_>,
    account: &mut Account,
) -> Result<(), LedgerError> {
    txn.execute(
        "UPDATE users SET cash = $1, assets = $2 WHERE id = $3",
        &[&account.cash, &account.assets, &account.user_id],
    )
    .await?;

    let symbols: Vec<String> = account.holdings.keys().cloned().collect();
    txn.execute(
        "DELETE FROM portfolio WHERE user_id = $1 AND NOT (stock = ANY($2))",
        &[&account.user_id, &symbols],
    )
    .await?;

    for holding in account.holdings.values() {
        txn.execute(
            "INSERT INTO portfolio (user_id, stock, shares, share_price, value) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, stock) DO UPDATE SET shares = EXCLUDED.shares, \
             share_price = EXCLUDED.share_price, value = EXCLUDED.value",
            &[
                &account.user_id,
                &holding.symbol,
                &holding.shares,
                &holding.share_price,
                &holding.value,
            ],
        )
        .await?;
    }

    for transaction in account.pending.drain(..) {
        let typ = transaction.typ.to_string();
        txn.execute(
            "INSERT INTO transactions (user_id, stock, shares, type, share_price_time, cost, time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &transaction.user_id,
                &transaction.symbol,
                &transaction.shares,
                &typ,
                &transaction.share_price,
                &transaction.cost,
                &transaction.time,
            ],
        )
        .await?;
    }
    Ok(())
}

impl PostgresStore {
    pub fn new(host: &str, user: &str, password: &str, dbname: &str) -> Result<Self> {
        let mut config = Config::new();
        config.host = Some(host.to_string());
        config.user = Some(user.to_string());
        config.password = Some(password.to_string());
        config.dbname = Some(dbname.to_string());

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), LedgerError> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        info!("STORE: schema ready");
        Ok(())
    }

    pub async fn create_user(&self, username: &str, hash: &str) -> Result<UserId, LedgerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "INSERT INTO users (username, hash) VALUES ($1, $2) ON CONFLICT (username) DO NOTHING RETURNING id",
                &[&username, &hash],
            )
            .await?;

        match row {
            Some(row) => Ok(row.try_get("id")?),
            None => Err(LedgerError::UsernameTaken),
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, LedgerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, username, hash FROM users WHERE username = $1",
                &[&username],
            )
            .await?;

        match row {
            Some(row) => Ok(Some(UserRecord {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                hash: row.try_get("hash")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn load_account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        let mut obj = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        let txn = client.transaction().await?;
        let account = read_account(&txn, user_id, false).await?;
        txn.commit().await?;
        Ok(account)
    }

    pub async fn update_account<T, F>(&self, user_id: UserId, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Account) -> Result<T, LedgerError>,
    {
        let mut obj = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        let txn = client.transaction().await?;

        let mut account = read_account(&txn, user_id, true).await?;
        //Dropping the transaction on error rolls back and releases the row lock
        let res = f(&mut account)?;
        write_account(&txn, &mut account).await?;
        txn.commit().await?;
        Ok(res)
    }

    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT user_id, stock, shares, type, share_price_time, cost, time FROM transactions \
                 WHERE user_id = $1 ORDER BY id",
                &[&user_id],
            )
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}
