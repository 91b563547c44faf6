//! Shared test utilities.
//!
//! Helpers for building an in-memory store and service graph and for creating
//! records with sensible defaults.

#![allow(clippy::unwrap_used)]

use crate::{
    app::Tesouraria,
    config::Settings,
    core::fornecedor::PagamentoRef,
    errors::Result,
    models::{Movimento, Pagamento, TipoMovimento, User},
    storage::{SqliteBackend, Store},
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A [`Store`] over a fresh in-memory `SQLite` database.
pub async fn setup_test_store() -> Result<Store> {
    let db = setup_test_db().await?;
    Ok(Store::new(
        Arc::new(SqliteBackend::new(db)),
        Duration::from_millis(20),
    ))
}

/// The full service graph over a fresh store, with no remote and default
/// settings. Default users are seeded.
pub async fn setup_test_app() -> Result<Tesouraria> {
    init_test_tracing();
    let app = Tesouraria::new(setup_test_store().await?, None, &Settings::default());
    app.seed().await?;
    Ok(app)
}

/// Midnight UTC on the given day.
pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Creates a pending invoice under `fornecedor`.
///
/// # Defaults
/// * due date: 2024-01-31
/// * method: transfer
/// * departamento: "Geral"
pub async fn create_test_pagamento(
    app: &Tesouraria,
    fornecedor: &str,
    referencia: &str,
    valor: f64,
) -> Result<PagamentoRef> {
    let mut pagamento = Pagamento::new(referencia, valor, date(2024, 1, 31));
    pagamento.departamento = "Geral".to_string();
    app.fornecedores.add_pagamento(fornecedor, pagamento, "teste").await
}

/// Credits the petty-cash ledger of `when`'s month with `valor`.
pub async fn fund_petty_cash(app: &Tesouraria, valor: f64, when: DateTime<Utc>) -> Result<()> {
    app.fundos
        .add_movimento(Movimento::new(when, TipoMovimento::Entrada, valor, "Saldo inicial"))
        .await?;
    Ok(())
}

/// Makes the seeded user `username` the session user.
pub async fn login(app: &Tesouraria, username: &str) -> User {
    let user = app.users.find_by_username(username).await.unwrap();
    assert!(app.users.set_current_user(Some(&user)).await);
    user
}
