//! Service graph.
//!
//! [`Tesouraria`] builds every service once over a shared [`Store`] and an
//! optional remote, and hands out references. Consumers receive the graph
//! explicitly; there is no global instance.

use crate::{
    config::{AppConfig, Settings, database},
    core::{
        calendario::CalendarioService, cheque::ChequeService, fornecedor::FornecedorService,
        fundo_maneio::FundoManeioService, notification::NotificationService,
        orcamento::OrcamentoService, receita::ReceitaService, sync::Synchronizer,
        transacao::TransacaoService, user::UserService, workflow::WorkflowEngine,
    },
    errors::Result,
    storage::{RemoteStore, SqliteBackend, Store},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Counts from [`Tesouraria::refresh_derived_states`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub pagamentos_atrasados: usize,
    pub receitas_alteradas: usize,
}

#[derive(Debug, Clone)]
pub struct Tesouraria {
    pub store: Store,
    pub fornecedores: FornecedorService,
    pub cheques: ChequeService,
    pub fundos: FundoManeioService,
    pub receitas: ReceitaService,
    pub transacoes: TransacaoService,
    pub calendario: CalendarioService,
    pub orcamentos: OrcamentoService,
    pub notifications: NotificationService,
    pub users: UserService,
    pub sync: Synchronizer,
    pub workflow: WorkflowEngine,
}

impl Tesouraria {
    /// Wires the services over `store` and `remote`.
    #[must_use]
    pub fn new(store: Store, remote: Option<Arc<dyn RemoteStore>>, settings: &Settings) -> Self {
        let fornecedores = FornecedorService::new(store.clone(), remote.clone());
        let cheques = ChequeService::new(store.clone(), remote.clone());
        let receitas = ReceitaService::new(store.clone(), remote);
        let fundos = FundoManeioService::new(store.clone());
        let transacoes = TransacaoService::new(store.clone());
        let calendario = CalendarioService::new(store.clone());
        let orcamentos = OrcamentoService::new(store.clone());
        let notifications = NotificationService::new(store.clone());
        let users = UserService::new(store.clone());

        let sync = Synchronizer::new(
            fornecedores.clone(),
            cheques.clone(),
            fundos.clone(),
            transacoes.clone(),
            calendario.clone(),
            users.clone(),
        );
        let workflow = WorkflowEngine::new(
            store.clone(),
            settings.workflow.clone(),
            fornecedores.clone(),
            sync.clone(),
            Arc::new(notifications.clone()),
        );

        Self {
            store,
            fornecedores,
            cheques,
            fundos,
            receitas,
            transacoes,
            calendario,
            orcamentos,
            notifications,
            users,
            sync,
            workflow,
        }
    }

    /// Opens the local store and, when configured, the remote mirror, then
    /// wires the services.
    ///
    /// # Errors
    /// Returns `Error::Database` if the local store cannot be opened. A
    /// remote failure only disables mirroring.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = database::create_connection(&config.database_url).await?;
        database::create_tables(&db).await?;
        info!("Local store ready");

        let store = Store::new(
            Arc::new(SqliteBackend::new(db)),
            config.settings.storage.debounce(),
        );
        let remote = database::connect_remote(config.remote_database_url.as_deref()).await;
        let app = Self::new(store, remote, &config.settings);

        match app.fornecedores.pull_remote().await {
            Ok(0) => {}
            Ok(merged) => info!("Merged {} payments from the remote mirror", merged),
            Err(e) => warn!("Could not pull payments from the remote mirror: {}", e),
        }
        Ok(app)
    }

    /// Seeds default users on an empty store.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn seed(&self) -> Result<usize> {
        self.users.seed_defaults().await
    }

    /// Applies the time-based state rules for payments and revenues.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn refresh_derived_states(&self, now: DateTime<Utc>) -> Result<RefreshSummary> {
        Ok(RefreshSummary {
            pagamentos_atrasados: self.fornecedores.refresh_estados(now).await?,
            receitas_alteradas: self.receitas.refresh_estados(now).await?,
        })
    }

    /// Writes every debounced value.
    pub async fn flush(&self) -> usize {
        self.store.flush().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::models::{EstadoPagamento, Notification, Receita};
    use crate::storage::{KeyValueBackend, MemoryBackend, keys};
    use crate::test_utils::{create_test_pagamento, date, setup_test_app};
    use std::time::Duration;

    fn memory_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            remote_database_url: None,
            settings: Settings::default(),
        }
    }

    #[tokio::test]
    async fn test_connect_local_only() -> Result<()> {
        let app = Tesouraria::connect(&memory_config()).await?;
        assert_eq!(app.seed().await?, 3);
        assert_eq!(app.seed().await?, 0);
        assert!(app.users.find_by_username("reitor").await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_derived_states() -> Result<()> {
        let app = setup_test_app().await?;
        let created = create_test_pagamento(&app, "Fornecedor A", "FT-1", 10.0).await?;
        app.receitas
            .add(Receita::new("Propinas", 900.0, date(2024, 1, 15)))
            .await?;

        let summary = app.refresh_derived_states(date(2024, 2, 10)).await?;
        assert_eq!(
            summary,
            RefreshSummary {
                pagamentos_atrasados: 1,
                receitas_alteradas: 1,
            }
        );
        let pagamento = app.fornecedores.find_pagamento(&created.pagamento.id).await.unwrap();
        assert_eq!(pagamento.pagamento.estado, EstadoPagamento::Atrasado);

        let again = app.refresh_derived_states(date(2024, 2, 11)).await?;
        assert_eq!(again, RefreshSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_services_share_one_store() -> Result<()> {
        let app = setup_test_app().await?;
        let created = create_test_pagamento(&app, "Fornecedor A", "FT-1", 10.0).await?;
        let found = app.fornecedores.find_by_nome("fornecedor a").await.unwrap();
        assert_eq!(found.id, created.fornecedor_id);

        app.sync.delete_fornecedor(&found.id).await?;
        assert!(app.fornecedores.list().await.is_empty());
        assert_eq!(app.flush().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_bursty_writes_wait_for_flush() -> Result<()> {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::new(backend.clone(), Duration::from_secs(60));
        let app = Tesouraria::new(store, None, &Settings::default());
        app.seed().await?;

        let reitor = app.users.find_by_username("reitor").await.unwrap();
        assert!(app.users.set_current_user(Some(&reitor)).await);
        for referencia in ["FT-1", "FT-2", "FT-3"] {
            app.notifications
                .add(Notification::new(&reitor.id, "Aprovar", referencia, "payment_approval", ""))
                .await?;
        }
        for notification in app.notifications.for_user(&reitor.id).await {
            app.notifications.mark_as_read(&notification.id).await?;
        }
        create_test_pagamento(&app, "Fornecedor A", "FT-1", 10.0).await?;
        app.refresh_derived_states(date(2024, 2, 10)).await?;

        // Readers see the queued values
        assert_eq!(app.notifications.unread_count(&reitor.id).await, 0);
        assert_eq!(app.users.actor().await, "reitor");

        // The backend does not, yet
        assert!(backend.get_raw(keys::CURRENT_USER).await?.is_none());
        let raw = backend.get_raw(keys::NOTIFICATIONS).await?.unwrap();
        let stored: Vec<Notification> = serde_json::from_str(&raw)?;
        assert!(stored.iter().all(|n| !n.read));

        // currentUser, notifications, fornecedores and receitas
        assert_eq!(app.flush().await, 4);
        let raw = backend.get_raw(keys::NOTIFICATIONS).await?.unwrap();
        let stored: Vec<Notification> = serde_json::from_str(&raw)?;
        assert!(stored.iter().all(|n| n.read));
        assert!(backend.get_raw(keys::CURRENT_USER).await?.is_some());
        assert_eq!(app.flush().await, 0);
        Ok(())
    }
}
