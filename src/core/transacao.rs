//! Bank reconciliation entries.

use crate::{
    errors::{Error, Result},
    models::TransacaoBancaria,
    storage::{Repository, Store},
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TransacaoService {
    repo: Repository<TransacaoBancaria>,
}

impl TransacaoService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
        }
    }

    pub async fn list(&self) -> Vec<TransacaoBancaria> {
        self.repo.list().await
    }

    pub async fn find_by_pagamento(&self, pagamento_id: &str) -> Option<TransacaoBancaria> {
        self.repo
            .find(|t| t.pagamento_id.as_deref() == Some(pagamento_id))
            .await
    }

    pub async fn find_by_cheque(&self, cheque_id: &str) -> Option<TransacaoBancaria> {
        self.repo
            .find(|t| t.cheque_id.as_deref() == Some(cheque_id))
            .await
    }

    /// # Errors
    /// Returns `Error::Validation` if a transaction with the same id exists.
    pub async fn add(&self, transacao: TransacaoBancaria) -> Result<TransacaoBancaria> {
        self.repo.add(transacao).await
    }

    /// Writes the single transaction of a payment: replaces the existing one
    /// (keeping its id) or appends a new one.
    ///
    /// # Errors
    /// Returns `Error::Validation` if `transacao` has no payment id.
    pub async fn upsert_for_pagamento(&self, mut transacao: TransacaoBancaria) -> Result<TransacaoBancaria> {
        let pagamento_id = transacao
            .pagamento_id
            .clone()
            .ok_or_else(|| Error::validation("Transaction has no payment id"))?;

        self.repo
            .mutate(move |transacoes| {
                match transacoes
                    .iter_mut()
                    .find(|t| t.pagamento_id.as_deref() == Some(pagamento_id.as_str()))
                {
                    Some(existing) => {
                        transacao.id.clone_from(&existing.id);
                        if transacao.cheque_id.is_none() {
                            transacao.cheque_id.clone_from(&existing.cheque_id);
                            transacao.cheque_numero.clone_from(&existing.cheque_numero);
                        }
                        *existing = transacao.clone();
                        debug!("Updated transaction {} for payment {}", transacao.id, pagamento_id);
                    }
                    None => {
                        transacoes.push(transacao.clone());
                        debug!("Created transaction {} for payment {}", transacao.id, pagamento_id);
                    }
                }
                Ok(transacao)
            })
            .await
    }

    /// Inserts the transaction of a cleared cheque unless the cheque, or the
    /// payment it settles, already has one. Returns whether a row was added.
    ///
    /// # Errors
    /// Returns `Error::Validation` if `transacao` has no cheque id.
    pub async fn insert_for_cheque(&self, transacao: TransacaoBancaria) -> Result<bool> {
        let cheque_id = transacao
            .cheque_id
            .clone()
            .ok_or_else(|| Error::validation("Transaction has no cheque id"))?;

        self.repo
            .mutate(move |transacoes| {
                if transacoes
                    .iter()
                    .any(|t| t.cheque_id.as_deref() == Some(cheque_id.as_str()))
                {
                    return Ok(false);
                }
                if let Some(pagamento_id) = transacao.pagamento_id.as_deref() {
                    if let Some(existing) = transacoes
                        .iter_mut()
                        .find(|t| t.pagamento_id.as_deref() == Some(pagamento_id))
                    {
                        existing.cheque_id = Some(cheque_id);
                        existing.cheque_numero.clone_from(&transacao.cheque_numero);
                        return Ok(false);
                    }
                }
                transacoes.push(transacao);
                Ok(true)
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the transaction does not exist.
    pub async fn set_reconciliado(&self, id: &str, reconciliado: bool) -> Result<TransacaoBancaria> {
        self.repo
            .mutate(|transacoes| {
                let transacao = transacoes
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| Error::not_found("TransacaoBancaria", id))?;
                transacao.reconciliado = reconciliado;
                Ok(transacao.clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the transaction does not exist.
    pub async fn delete(&self, id: &str) -> Result<TransacaoBancaria> {
        self.repo.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, setup_test_store};

    fn for_pagamento(pagamento_id: &str, descricao: &str) -> TransacaoBancaria {
        let mut t = TransacaoBancaria::debito(date(2024, 1, 10), descricao, 100.0);
        t.pagamento_id = Some(pagamento_id.to_string());
        t
    }

    #[tokio::test]
    async fn test_upsert_for_pagamento_never_duplicates() -> Result<()> {
        let service = TransacaoService::new(setup_test_store().await?);

        let first = service.upsert_for_pagamento(for_pagamento("p1", "primeira")).await?;
        let second = service.upsert_for_pagamento(for_pagamento("p1", "segunda")).await?;

        let all = service.list().await;
        assert_eq!(all.len(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(all[0].descricao, "segunda");
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_for_cheque_is_idempotent() -> Result<()> {
        let service = TransacaoService::new(setup_test_store().await?);
        let mut t = TransacaoBancaria::debito(date(2024, 1, 10), "Cheque nº 1", 100.0);
        t.cheque_id = Some("c1".to_string());

        assert!(service.insert_for_cheque(t.clone()).await?);
        t.id = "another".to_string();
        assert!(!service.insert_for_cheque(t).await?);
        assert_eq!(service.list().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_for_cheque_links_existing_payment_transaction() -> Result<()> {
        let service = TransacaoService::new(setup_test_store().await?);
        service.upsert_for_pagamento(for_pagamento("p9", "transferência")).await?;

        let mut t = for_pagamento("p9", "Cheque nº 77");
        t.cheque_id = Some("c9".to_string());
        t.cheque_numero = Some("77".to_string());
        assert!(!service.insert_for_cheque(t).await?);

        let all = service.list().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cheque_id.as_deref(), Some("c9"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_keys_are_rejected() -> Result<()> {
        let service = TransacaoService::new(setup_test_store().await?);
        let bare = TransacaoBancaria::debito(date(2024, 1, 10), "avulsa", 5.0);
        assert!(matches!(
            service.upsert_for_pagamento(bare.clone()).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(service.insert_for_cheque(bare).await, Err(Error::Validation { .. })));
        Ok(())
    }
}
