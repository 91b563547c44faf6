//! Fiscal calendar.

use crate::{
    errors::{Error, Result},
    models::EventoFiscal,
    storage::{Repository, Store},
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CalendarioService {
    repo: Repository<EventoFiscal>,
}

impl CalendarioService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
        }
    }

    /// Events ordered by date.
    pub async fn list(&self) -> Vec<EventoFiscal> {
        let mut eventos = self.repo.list().await;
        eventos.sort_by_key(|e| e.data);
        eventos
    }

    /// Open events due on or before `until`.
    pub async fn pendentes_ate(&self, until: DateTime<Utc>) -> Vec<EventoFiscal> {
        self.list()
            .await
            .into_iter()
            .filter(|e| !e.concluido && e.data <= until)
            .collect()
    }

    /// # Errors
    /// Returns `Error::Validation` for an empty title.
    pub async fn add_evento(
        &self,
        titulo: &str,
        data: DateTime<Utc>,
        descricao: &str,
        pagamento_id: Option<&str>,
    ) -> Result<EventoFiscal> {
        if titulo.trim().is_empty() {
            return Err(Error::validation("Event title cannot be empty"));
        }
        self.repo
            .add(EventoFiscal {
                id: uuid::Uuid::new_v4().to_string(),
                titulo: titulo.trim().to_string(),
                data,
                descricao: descricao.to_string(),
                concluido: false,
                pagamento_id: pagamento_id.map(ToString::to_string),
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the event does not exist.
    pub async fn set_concluido(&self, id: &str, concluido: bool) -> Result<EventoFiscal> {
        self.repo
            .mutate(|eventos| {
                let evento = eventos
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| Error::not_found("EventoFiscal", id))?;
                evento.concluido = concluido;
                Ok(evento.clone())
            })
            .await
    }

    /// Completes every event linked to `pagamento_id`. Returns how many
    /// changed.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn concluir_por_pagamento(&self, pagamento_id: &str) -> Result<usize> {
        self.repo
            .mutate(|eventos| {
                let mut changed = 0;
                for evento in eventos
                    .iter_mut()
                    .filter(|e| !e.concluido && e.pagamento_id.as_deref() == Some(pagamento_id))
                {
                    evento.concluido = true;
                    changed += 1;
                }
                Ok(changed)
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the event does not exist.
    pub async fn delete(&self, id: &str) -> Result<EventoFiscal> {
        self.repo.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, setup_test_store};

    #[tokio::test]
    async fn test_concluir_por_pagamento() -> Result<()> {
        let service = CalendarioService::new(setup_test_store().await?);
        service.add_evento("IVA", date(2024, 2, 20), "", Some("p1")).await?;
        service.add_evento("IRPS", date(2024, 2, 10), "", None).await?;

        assert_eq!(service.concluir_por_pagamento("p1").await?, 1);
        assert_eq!(service.concluir_por_pagamento("p1").await?, 0);

        let pendentes = service.pendentes_ate(date(2024, 3, 1)).await;
        assert_eq!(pendentes.len(), 1);
        assert_eq!(pendentes[0].titulo, "IRPS");
        Ok(())
    }

    #[tokio::test]
    async fn test_add_evento_requires_title() -> Result<()> {
        let service = CalendarioService::new(setup_test_store().await?);
        let result = service.add_evento(" ", date(2024, 2, 20), "", None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }
}
