//! # What is papertrade?
//!
//! papertrade is a paper stock-trading server. Users register, look up quotes, buy and sell
//! shares with simulated cash and review their trading history. The server returns JSON and a
//! Rust client is provided, as much for documenting how to call the server as for scripting it.
//!
//! # Implementation
//!
//! - The [ledger](crate::ledger) holds the accounting. It operates on an
//! [Account](crate::ledger::Account) snapshot and has no knowledge of storage.
//! - A [store](crate::store) loads accounts and writes them back atomically, either to Postgres
//! or to memory.
//! - A [price source](crate::quote::PriceSource) looks up the latest price for a symbol, from IEX
//! Cloud or from a fixed table.
//! - The [server](crate::http::finance::server) exposes each operation as a JSON endpoint and the
//! [client](crate::client::finance) wraps those endpoints.
//!
//! New accounts start with $10,000.00 in cash. Trades execute immediately at the looked-up price,
//! there is no order book.
//!
//! ```text
//! API_KEY=... cargo run --bin finance_server [ipv4_address] [port] [host] [user] [password] [dbname]
//! cargo run --bin finance_server [ipv4_address] [port] --memory
//! ```
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod http;
pub mod ledger;
pub mod quote;
pub mod store;
