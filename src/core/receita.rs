//! Revenues.

use crate::{
    errors::{Error, Result},
    models::{EstadoReceita, Receita},
    storage::{RemoteStore, Repository, Store},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReceitaService {
    repo: Repository<Receita>,
}

fn validate(receita: &Receita) -> Result<()> {
    if receita.descricao.trim().is_empty() {
        return Err(Error::validation("Revenue description cannot be empty"));
    }
    if !receita.valor.is_finite() || receita.valor <= 0.0 {
        return Err(Error::validation(format!(
            "Revenue amount must be positive, got {}",
            receita.valor
        )));
    }
    if receita.estado == EstadoReceita::Recebida && receita.data_recebimento.is_none() {
        return Err(Error::validation(format!(
            "Revenue '{}' is received without a receipt date",
            receita.descricao
        )));
    }
    Ok(())
}

impl ReceitaService {
    #[must_use]
    pub const fn new(store: Store, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            repo: Repository::new(store, remote),
        }
    }

    pub async fn list(&self) -> Vec<Receita> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &str) -> Option<Receita> {
        self.repo.get(id).await
    }

    /// # Errors
    /// Returns `Error::Validation` for invalid fields.
    pub async fn add(&self, mut receita: Receita) -> Result<Receita> {
        validate(&receita)?;
        self.repo.ensure_remote_id(&mut receita.id).await;
        self.repo.add(receita).await
    }

    /// Replaces a revenue. A late revenue that now has a receipt date becomes
    /// received.
    ///
    /// # Errors
    /// Returns `Error::Validation` for invalid fields, `Error::NotFound` if the
    /// revenue does not exist.
    pub async fn update(&self, mut receita: Receita) -> Result<Receita> {
        if receita.estado == EstadoReceita::Atrasada && receita.data_recebimento.is_some() {
            receita.estado = EstadoReceita::Recebida;
        }
        validate(&receita)?;
        self.repo.update(receita).await
    }

    /// Records receipt of the revenue at `when`.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the revenue does not exist.
    pub async fn marcar_recebida(&self, id: &str, when: DateTime<Utc>) -> Result<Receita> {
        self.repo
            .mutate(|receitas| {
                let receita = receitas
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or_else(|| Error::not_found("Receita", id))?;
                receita.data_recebimento = Some(when);
                receita.estado = EstadoReceita::Recebida;
                Ok(receita.clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the revenue does not exist.
    pub async fn set_reconciliado(&self, id: &str, reconciliado: bool) -> Result<Receita> {
        self.repo
            .mutate(|receitas| {
                let receita = receitas
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or_else(|| Error::not_found("Receita", id))?;
                receita.reconciliado = reconciliado;
                Ok(receita.clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the revenue does not exist.
    pub async fn delete(&self, id: &str) -> Result<Receita> {
        self.repo.delete(id).await
    }

    /// Applies the overdue and late-receipt transitions as of `now`. Returns
    /// how many revenues changed state.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn refresh_estados(&self, now: DateTime<Utc>) -> Result<usize> {
        let changed = self
            .repo
            .mutate_debounced(|receitas| {
                let mut changed = 0;
                for receita in receitas.iter_mut() {
                    let estado = receita.estado_derivado(now);
                    if estado != receita.estado {
                        receita.estado = estado;
                        changed += 1;
                    }
                }
                Ok(changed)
            })
            .await?;
        if changed > 0 {
            info!("Updated state of {} revenues", changed);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, setup_test_store};

    #[tokio::test]
    async fn test_add_validates() -> Result<()> {
        let service = ReceitaService::new(setup_test_store().await?, None);
        let empty = Receita::new("  ", 10.0, date(2024, 1, 1));
        assert!(matches!(service.add(empty).await, Err(Error::Validation { .. })));

        let negative = Receita::new("Propinas", -5.0, date(2024, 1, 1));
        assert!(matches!(service.add(negative).await, Err(Error::Validation { .. })));
        assert!(service.list().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_estados_marks_overdue_then_received() -> Result<()> {
        let service = ReceitaService::new(setup_test_store().await?, None);
        let past = service.add(Receita::new("Propinas", 900.0, date(2024, 1, 5))).await?;
        let future = service.add(Receita::new("Subsídio", 50.0, date(2024, 12, 5))).await?;

        assert_eq!(service.refresh_estados(date(2024, 2, 1)).await?, 1);
        assert_eq!(service.get(&past.id).await.map(|r| r.estado), Some(EstadoReceita::Atrasada));
        assert_eq!(service.get(&future.id).await.map(|r| r.estado), Some(EstadoReceita::Prevista));

        // Setting the receipt date on a late revenue completes it
        let mut late = service.get(&past.id).await.ok_or_else(|| Error::not_found("Receita", &past.id))?;
        late.data_recebimento = Some(date(2024, 2, 10));
        let updated = service.update(late).await?;
        assert_eq!(updated.estado, EstadoReceita::Recebida);

        assert_eq!(service.refresh_estados(date(2024, 3, 1)).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_marcar_recebida_and_reconcile() -> Result<()> {
        let service = ReceitaService::new(setup_test_store().await?, None);
        let receita = service.add(Receita::new("Aluguer", 300.0, date(2024, 4, 1))).await?;

        let received = service.marcar_recebida(&receita.id, date(2024, 4, 2)).await?;
        assert_eq!(received.estado, EstadoReceita::Recebida);
        assert!(service.set_reconciliado(&receita.id, true).await?.reconciliado);
        Ok(())
    }
}
