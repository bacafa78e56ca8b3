use actix_web::{web, App, HttpServer};
use log::info;

use papertrade::config::{ServerConfig, StoreConfig, DEMO_SYMBOLS};
use papertrade::http::finance::server::*;
use papertrade::http::finance::AppState;
use papertrade::quote::{Fixed, PriceSource};
use papertrade::store::{PostgresStore, Store};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = ServerConfig::from_env()?;

    let store = match &config.store {
        StoreConfig::Memory => Store::memory(),
        StoreConfig::Postgres {
            host,
            user,
            password,
            dbname,
        } => Store::Postgres(PostgresStore::new(host, user, password, dbname)?),
    };
    store.migrate().await?;

    let prices = match &config.api_key {
        Some(key) => PriceSource::iex(key.clone()),
        None => PriceSource::Fixed(Fixed::random(DEMO_SYMBOLS.to_vec())),
    };

    let app_state = AppState::new(store, prices);
    let finance_state = web::Data::new(app_state);

    info!("SERVER: listening on {}:{}", config.address, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(no_cache())
            .app_data(finance_state.clone())
            .configure(routes)
    })
    .bind((config.address.clone(), config.port))?
    .run()
    .await?;
    Ok(())
}
