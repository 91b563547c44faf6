//! Cheque register.

use crate::{
    errors::{Error, Result},
    models::{Cheque, EstadoCheque},
    storage::{RemoteStore, Repository, Store},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ChequeService {
    repo: Repository<Cheque>,
}

fn validate(cheque: &Cheque) -> Result<()> {
    if cheque.numero.trim().is_empty() {
        return Err(Error::validation("Cheque number cannot be empty"));
    }
    if !cheque.valor.is_finite() || cheque.valor <= 0.0 {
        return Err(Error::validation(format!(
            "Cheque amount must be positive, got {}",
            cheque.valor
        )));
    }
    if cheque.estado == EstadoCheque::Compensado && cheque.data_compensacao.is_none() {
        return Err(Error::validation(format!(
            "Cheque {} is cleared without a clearing date",
            cheque.numero
        )));
    }
    Ok(())
}

impl ChequeService {
    #[must_use]
    pub const fn new(store: Store, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            repo: Repository::new(store, remote),
        }
    }

    pub async fn list(&self) -> Vec<Cheque> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &str) -> Option<Cheque> {
        self.repo.get(id).await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the cheque does not exist.
    pub async fn require(&self, id: &str) -> Result<Cheque> {
        self.repo.require(id).await
    }

    /// The cheque settling `pagamento_id`, if any.
    pub async fn find_by_pagamento(&self, pagamento_id: &str) -> Option<Cheque> {
        self.repo
            .find(|c| c.pagamento_id.as_deref() == Some(pagamento_id))
            .await
    }

    pub async fn find_by_numero(&self, numero: &str) -> Option<Cheque> {
        self.repo.find(|c| c.numero == numero).await
    }

    /// Registers a cheque. A payment can be settled by at most one cheque.
    ///
    /// # Errors
    /// Returns `Error::Validation` for invalid fields or if the payment already
    /// has a cheque.
    pub async fn add_cheque(&self, mut cheque: Cheque) -> Result<Cheque> {
        validate(&cheque)?;
        self.repo.ensure_remote_id(&mut cheque.id).await;
        let added = self
            .repo
            .mutate(move |cheques| {
                if let Some(pagamento_id) = cheque.pagamento_id.as_deref() {
                    if let Some(existing) = cheques
                        .iter()
                        .find(|c| c.pagamento_id.as_deref() == Some(pagamento_id))
                    {
                        return Err(Error::validation(format!(
                            "Payment {pagamento_id} already has cheque {}",
                            existing.numero
                        )));
                    }
                }
                cheques.push(cheque.clone());
                Ok(cheque)
            })
            .await?;
        info!("Registered cheque {} ({:.2})", added.numero, added.valor);
        Ok(added)
    }

    /// # Errors
    /// Returns `Error::Validation` for invalid fields, `Error::NotFound` if the
    /// cheque does not exist.
    pub async fn update(&self, cheque: Cheque) -> Result<Cheque> {
        validate(&cheque)?;
        self.repo.update(cheque).await
    }

    /// Marks the cheque as cleared at `when`. Clearing twice keeps the first
    /// date.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the cheque does not exist, or
    /// `Error::Validation` if it was cancelled.
    pub async fn compensar(&self, id: &str, when: DateTime<Utc>) -> Result<Cheque> {
        self.repo
            .mutate(|cheques| {
                let cheque = cheques
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or_else(|| Error::not_found("Cheque", id))?;
                if cheque.estado == EstadoCheque::Cancelado {
                    return Err(Error::validation(format!(
                        "Cheque {} is cancelled and cannot be cleared",
                        cheque.numero
                    )));
                }
                cheque.estado = EstadoCheque::Compensado;
                cheque.data_compensacao.get_or_insert(when);
                Ok(cheque.clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the cheque does not exist, or
    /// `Error::Validation` if it was already cleared.
    pub async fn cancelar(&self, id: &str) -> Result<Cheque> {
        self.repo
            .mutate(|cheques| {
                let cheque = cheques
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or_else(|| Error::not_found("Cheque", id))?;
                if cheque.estado == EstadoCheque::Compensado {
                    return Err(Error::validation(format!(
                        "Cheque {} is already cleared",
                        cheque.numero
                    )));
                }
                cheque.estado = EstadoCheque::Cancelado;
                Ok(cheque.clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the cheque does not exist.
    pub async fn delete(&self, id: &str) -> Result<Cheque> {
        self.repo.delete(id).await
    }

    /// Cuts the link between `pagamento_id` and its cheque, keeping the
    /// cheque. Returns the detached cheque, if there was one.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn detach_pagamento(&self, pagamento_id: &str) -> Result<Option<Cheque>> {
        self.repo
            .mutate(|cheques| {
                Ok(cheques
                    .iter_mut()
                    .find(|c| c.pagamento_id.as_deref() == Some(pagamento_id))
                    .map(|c| {
                        c.detach();
                        c.clone()
                    }))
            })
            .await
    }
}
