use chrono::Utc;
use dotenvy::dotenv;
use tesouraria::{Result, Tesouraria, config::AppConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal
    dotenv().ok();

    // 3. Configuration
    let config = AppConfig::from_env()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Local store and optional remote mirror
    let app = Tesouraria::connect(&config)
        .await
        .inspect_err(|e| error!("Failed to open the store: {}", e))?;

    // 5. Seed users and apply date-based state changes
    let seeded = app.seed().await?;
    if seeded > 0 {
        info!("Seeded {} default users", seeded);
    }
    let summary = app.refresh_derived_states(Utc::now()).await?;
    info!(
        "{} payments now overdue, {} revenues changed state",
        summary.pagamentos_atrasados, summary.receitas_alteradas
    );

    let fornecedores = app.fornecedores.list().await;
    let pagamentos: usize = fornecedores.iter().map(|f| f.pagamentos.len()).sum();
    info!(
        "{} suppliers, {} payments, {} cheques, {} revenues",
        fornecedores.len(),
        pagamentos,
        app.cheques.list().await.len(),
        app.receitas.list().await.len()
    );
    if let Some(ledger) = app.fundos.ledger_for(&Utc::now()).await {
        info!("Petty cash balance this month: {:.2}", ledger.saldo_final);
    }

    let flushed = app.flush().await;
    info!("Flushed {} pending writes", flushed);
    Ok(())
}
