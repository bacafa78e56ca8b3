use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::ledger::{Account, Holding, LedgerError, Transaction, UserId, STARTING_CASH};

use super::UserRecord;

#[derive(Debug)]
struct UserRow {
    id: UserId,
    username: String,
    hash: String,
    cash: f64,
    assets: f64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    last: UserId,
    users: Vec<UserRow>,
    portfolios: HashMap<UserId, BTreeMap<String, Holding>>,
    transactions: Vec<Transaction>,
}

/// Single mutex over every table, trades are serialised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_user(&self, username: &str, hash: &str) -> Result<UserId, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.username == username) {
            return Err(LedgerError::UsernameTaken);
        }

        let id = inner.last + 1;
        inner.users.push(UserRow {
            id,
            username: username.to_string(),
            hash: hash.to_string(),
            cash: STARTING_CASH,
            assets: STARTING_CASH,
        });
        inner.last = id;
        Ok(id)
    }

    pub fn find_user(&self, username: &str) -> Option<UserRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| UserRecord {
                id: u.id,
                username: u.username.clone(),
                hash: u.hash.clone(),
            })
    }

    fn read_account(inner: &MemoryInner, user_id: UserId) -> Result<Account, LedgerError> {
        let user = inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(LedgerError::UnknownUser)?;

        let mut account = Account::new(user.id, user.username.clone(), user.cash);
        account.assets = user.assets;
        if let Some(holdings) = inner.portfolios.get(&user_id) {
            account.holdings = holdings.clone();
        }
        Ok(account)
    }

    pub fn load_account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        let inner = self.inner.lock().unwrap();
        Self::read_account(&inner, user_id)
    }

    pub fn update_account<T, F>(&self, user_id: UserId, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Account) -> Result<T, LedgerError>,
    {
        let mut inner = self.inner.lock().unwrap();
        let mut account = Self::read_account(&inner, user_id)?;
        let res = f(&mut account)?;

        if let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) {
            user.cash = account.cash;
            user.assets = account.assets;
        }
        inner.portfolios.insert(user_id, account.holdings);
        inner.transactions.append(&mut account.pending);
        Ok(res)
    }

    pub fn transactions(&self, user_id: UserId) -> Vec<Transaction> {
        let inner = self.inner.lock().unwrap();
        inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}
