//! Persistence for users, portfolios and trading history.
//!
//! Two backends share one interface: Postgres for the server and an in-memory store for tests and
//! local runs. Trades go through [Store::update_account] which loads an account, applies the
//! ledger operation and writes the result back atomically. If the operation fails nothing is
//! written.
pub mod memory;
pub mod postgres;

use serde::{Deserialize, Serialize};

use crate::ledger::{Account, LedgerError, Transaction, UserId};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub hash: String,
}

#[derive(Debug)]
pub enum Store {
    Memory(MemoryStore),
    Postgres(PostgresStore),
}

impl Store {
    pub fn memory() -> Self {
        Store::Memory(MemoryStore::new())
    }

    pub async fn migrate(&self) -> Result<(), LedgerError> {
        match self {
            Store::Memory(_) => Ok(()),
            Store::Postgres(pg) => pg.migrate().await,
        }
    }

    pub async fn create_user(&self, username: &str, hash: &str) -> Result<UserId, LedgerError> {
        match self {
            Store::Memory(mem) => mem.create_user(username, hash),
            Store::Postgres(pg) => pg.create_user(username, hash).await,
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, LedgerError> {
        match self {
            Store::Memory(mem) => Ok(mem.find_user(username)),
            Store::Postgres(pg) => pg.find_user(username).await,
        }
    }

    pub async fn load_account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        match self {
            Store::Memory(mem) => mem.load_account(user_id),
            Store::Postgres(pg) => pg.load_account(user_id).await,
        }
    }

    pub async fn update_account<T, F>(&self, user_id: UserId, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Account) -> Result<T, LedgerError>,
    {
        match self {
            Store::Memory(mem) => mem.update_account(user_id, f),
            Store::Postgres(pg) => pg.update_account(user_id, f).await,
        }
    }

    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        match self {
            Store::Memory(mem) => Ok(mem.transactions(user_id)),
            Store::Postgres(pg) => pg.transactions(user_id).await,
        }
    }
}
