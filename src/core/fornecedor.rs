//! Suppliers and their payments.
//!
//! Payments live inside their supplier's document under the `fornecedores`
//! key. When a remote is configured each payment is also mirrored as its own
//! row in the `pagamentos` table, tagged with the owning supplier.

use crate::{
    errors::{Error, Result},
    models::{AcaoHistorico, EstadoPagamento, Fornecedor, HistoricoEntry, Pagamento},
    storage::{RemoteStore, Repository, Store, remote::is_valid_uuid_local},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PAGAMENTOS_TABLE: &str = "pagamentos";

/// A payment together with the supplier that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct PagamentoRef {
    pub fornecedor_id: String,
    pub fornecedor_nome: String,
    pub pagamento: Pagamento,
}

#[derive(Debug, Clone)]
pub struct FornecedorService {
    repo: Repository<Fornecedor>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn validate_nome(nome: &str) -> Result<()> {
    if nome.trim().is_empty() {
        return Err(Error::validation("Supplier name cannot be empty"));
    }
    Ok(())
}

impl FornecedorService {
    #[must_use]
    pub const fn new(store: Store, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            repo: Repository::new(store, remote),
        }
    }

    pub async fn list(&self) -> Vec<Fornecedor> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &str) -> Option<Fornecedor> {
        self.repo.get(id).await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the supplier does not exist.
    pub async fn require(&self, id: &str) -> Result<Fornecedor> {
        self.repo.require(id).await
    }

    /// Case-insensitive lookup by name.
    pub async fn find_by_nome(&self, nome: &str) -> Option<Fornecedor> {
        self.repo.find(|f| same_name(&f.nome, nome)).await
    }

    /// # Errors
    /// Returns `Error::Validation` for an empty or already used name.
    pub async fn add_fornecedor(&self, nome: &str) -> Result<Fornecedor> {
        validate_nome(nome)?;
        let fornecedor = self
            .repo
            .mutate(|fornecedores| {
                if fornecedores.iter().any(|f| same_name(&f.nome, nome)) {
                    return Err(Error::validation(format!("Supplier '{}' already exists", nome.trim())));
                }
                let fornecedor = Fornecedor::new(nome.trim());
                fornecedores.push(fornecedor.clone());
                Ok(fornecedor)
            })
            .await?;
        info!("Created supplier '{}'", fornecedor.nome);
        Ok(fornecedor)
    }

    /// Returns the supplier named `nome`, creating it if needed.
    ///
    /// # Errors
    /// Returns `Error::Validation` for an empty name.
    pub async fn find_or_create(&self, nome: &str) -> Result<Fornecedor> {
        match self.find_by_nome(nome).await {
            Some(fornecedor) => Ok(fornecedor),
            None => self.add_fornecedor(nome).await,
        }
    }

    /// Renames a supplier.
    ///
    /// # Errors
    /// Returns `Error::Validation` for an empty or taken name, and
    /// `Error::NotFound` if the supplier does not exist.
    pub async fn update_fornecedor(&self, id: &str, nome: &str) -> Result<Fornecedor> {
        validate_nome(nome)?;
        let fornecedor = self
            .repo
            .mutate(|fornecedores| {
                if fornecedores.iter().any(|f| f.id != id && same_name(&f.nome, nome)) {
                    return Err(Error::validation(format!("Supplier '{}' already exists", nome.trim())));
                }
                let fornecedor = fornecedores
                    .iter_mut()
                    .find(|f| f.id == id)
                    .ok_or_else(|| Error::not_found("Fornecedor", id))?;
                fornecedor.nome = nome.trim().to_string();
                Ok(fornecedor.clone())
            })
            .await?;
        for pagamento in &fornecedor.pagamentos {
            self.mirror(&fornecedor.id, &fornecedor.nome, pagamento).await;
        }
        Ok(fornecedor)
    }

    /// Removes a supplier and its payments, without touching cheques or
    /// movements that reference them.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the supplier does not exist.
    pub async fn remove_fornecedor(&self, id: &str) -> Result<Fornecedor> {
        let removed = self.repo.delete(id).await?;
        for pagamento in &removed.pagamentos {
            self.unmirror(&pagamento.id).await;
        }
        info!(
            "Removed supplier '{}' with {} payments",
            removed.nome,
            removed.pagamentos.len()
        );
        Ok(removed)
    }

    /// Finds a payment by id across all suppliers.
    pub async fn find_pagamento(&self, pagamento_id: &str) -> Option<PagamentoRef> {
        self.repo.load_local().await.into_iter().find_map(|f| {
            let pagamento = f.pagamento(pagamento_id)?.clone();
            Some(PagamentoRef {
                fornecedor_id: f.id,
                fornecedor_nome: f.nome,
                pagamento,
            })
        })
    }

    /// # Errors
    /// Returns `Error::NotFound` if the supplier or the payment does not exist.
    pub async fn require_pagamento(&self, fornecedor_id: &str, pagamento_id: &str) -> Result<PagamentoRef> {
        let fornecedor = self.require(fornecedor_id).await?;
        let pagamento = fornecedor
            .pagamento(pagamento_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Pagamento", pagamento_id))?;
        Ok(PagamentoRef {
            fornecedor_id: fornecedor.id,
            fornecedor_nome: fornecedor.nome,
            pagamento,
        })
    }

    /// Adds a payment to the supplier named `fornecedor_nome`, creating the
    /// supplier if it does not exist yet.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the payment is invalid or its id is
    /// already used.
    pub async fn add_pagamento(
        &self,
        fornecedor_nome: &str,
        mut pagamento: Pagamento,
        actor: &str,
    ) -> Result<PagamentoRef> {
        validate_nome(fornecedor_nome)?;
        pagamento.validate()?;
        self.repo.ensure_remote_id(&mut pagamento.id).await;
        pagamento.historico.push(HistoricoEntry::new(
            actor,
            AcaoHistorico::Create,
            format!("Pagamento {} criado", pagamento.referencia),
        ));

        let added = self
            .repo
            .mutate(move |fornecedores| {
                if fornecedores
                    .iter()
                    .any(|f| f.pagamento(&pagamento.id).is_some())
                {
                    return Err(Error::validation(format!(
                        "Payment '{}' already exists",
                        pagamento.id
                    )));
                }

                let index = match fornecedores
                    .iter()
                    .position(|f| same_name(&f.nome, fornecedor_nome))
                {
                    Some(index) => index,
                    None => {
                        info!("Creating supplier '{}' for new payment", fornecedor_nome.trim());
                        fornecedores.push(Fornecedor::new(fornecedor_nome.trim()));
                        fornecedores.len() - 1
                    }
                };
                let fornecedor = &mut fornecedores[index];
                fornecedor.pagamentos.push(pagamento.clone());
                Ok(PagamentoRef {
                    fornecedor_id: fornecedor.id.clone(),
                    fornecedor_nome: fornecedor.nome.clone(),
                    pagamento,
                })
            })
            .await?;

        debug!(
            "Added payment {} ({:.2}) to '{}'",
            added.pagamento.referencia, added.pagamento.valor, added.fornecedor_nome
        );
        self.mirror_ref(&added).await;
        Ok(added)
    }

    /// Applies `change` to a stored payment, validates the result and appends
    /// an audit entry. Nothing is written if `change` or validation fails.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the supplier or payment does not exist,
    /// `Error::Validation` if the changed payment is invalid, or the error
    /// returned by `change`.
    pub async fn modify_pagamento(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        actor: &str,
        details: &str,
        change: impl FnOnce(&mut Pagamento) -> Result<()>,
    ) -> Result<PagamentoRef> {
        let updated = self
            .repo
            .mutate(|fornecedores| {
                let fornecedor = fornecedores
                    .iter_mut()
                    .find(|f| f.id == fornecedor_id)
                    .ok_or_else(|| Error::not_found("Fornecedor", fornecedor_id))?;
                let fornecedor_nome = fornecedor.nome.clone();
                let slot = fornecedor
                    .pagamento_mut(pagamento_id)
                    .ok_or_else(|| Error::not_found("Pagamento", pagamento_id))?;

                let mut draft = slot.clone();
                change(&mut draft)?;
                draft.id = pagamento_id.to_string();
                draft.validate()?;
                draft
                    .historico
                    .push(HistoricoEntry::new(actor, AcaoHistorico::Update, details));
                *slot = draft.clone();

                Ok(PagamentoRef {
                    fornecedor_id: fornecedor_id.to_string(),
                    fornecedor_nome,
                    pagamento: draft,
                })
            })
            .await?;

        self.mirror_ref(&updated).await;
        Ok(updated)
    }

    /// Replaces a payment's fields with `pagamento`'s. The stored audit log is
    /// kept and extended.
    ///
    /// # Errors
    /// Same as [`Self::modify_pagamento`].
    pub async fn update_pagamento(
        &self,
        fornecedor_id: &str,
        pagamento: Pagamento,
        actor: &str,
    ) -> Result<PagamentoRef> {
        let pagamento_id = pagamento.id.clone();
        let details = format!("Pagamento {} atualizado", pagamento.referencia);
        self.modify_pagamento(fornecedor_id, &pagamento_id, actor, &details, move |stored| {
            let historico = std::mem::take(&mut stored.historico);
            *stored = pagamento;
            stored.historico = historico;
            Ok(())
        })
        .await
    }

    /// Removes a payment without any reference cleanup.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the supplier or payment does not exist.
    pub async fn remove_pagamento(&self, fornecedor_id: &str, pagamento_id: &str) -> Result<Pagamento> {
        let removed = self
            .repo
            .mutate(|fornecedores| {
                let fornecedor = fornecedores
                    .iter_mut()
                    .find(|f| f.id == fornecedor_id)
                    .ok_or_else(|| Error::not_found("Fornecedor", fornecedor_id))?;
                let index = fornecedor
                    .pagamentos
                    .iter()
                    .position(|p| p.id == pagamento_id)
                    .ok_or_else(|| Error::not_found("Pagamento", pagamento_id))?;
                Ok(fornecedor.pagamentos.remove(index))
            })
            .await?;
        self.unmirror(pagamento_id).await;
        Ok(removed)
    }

    /// Marks pending payments past their due date as late. Returns how many
    /// changed.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn refresh_estados(&self, now: DateTime<Utc>) -> Result<usize> {
        let changed = self
            .repo
            .mutate_debounced(|fornecedores| {
                let mut changed = Vec::new();
                for fornecedor in fornecedores.iter_mut() {
                    for pagamento in &mut fornecedor.pagamentos {
                        if pagamento.estado == EstadoPagamento::Pendente
                            && pagamento.data_vencimento < now
                        {
                            pagamento.estado = EstadoPagamento::Atrasado;
                            pagamento.historico.push(HistoricoEntry::new(
                                "sistema",
                                AcaoHistorico::Update,
                                "Pagamento em atraso",
                            ));
                            changed.push(PagamentoRef {
                                fornecedor_id: fornecedor.id.clone(),
                                fornecedor_nome: fornecedor.nome.clone(),
                                pagamento: pagamento.clone(),
                            });
                        }
                    }
                }
                Ok(changed)
            })
            .await?;

        for pagamento in &changed {
            self.mirror_ref(pagamento).await;
        }
        if !changed.is_empty() {
            info!("Marked {} payments as late", changed.len());
        }
        Ok(changed.len())
    }

    /// Merges the payments mirrored remotely into the local suppliers.
    /// Returns how many rows were merged.
    ///
    /// # Errors
    /// Returns the remote error if the table cannot be read.
    pub async fn pull_remote(&self) -> Result<usize> {
        let Some(remote) = self.repo.remote() else {
            return Ok(0);
        };
        let rows = remote.fetch_all(PAGAMENTOS_TABLE).await?;

        let mut remote_pagamentos = Vec::with_capacity(rows.len());
        for row in rows {
            let fornecedor_id = row.get("fornecedorId").and_then(Value::as_str).map(str::to_string);
            let fornecedor_nome = row.get("fornecedorNome").and_then(Value::as_str).map(str::to_string);
            match (fornecedor_id, fornecedor_nome, serde_json::from_value::<Pagamento>(row)) {
                (Some(id), Some(nome), Ok(pagamento)) => remote_pagamentos.push((id, nome, pagamento)),
                (_, _, Err(e)) => warn!("Skipping malformed payment row: {}", e),
                _ => warn!("Skipping payment row without supplier"),
            }
        }

        self.repo
            .mutate(move |fornecedores| {
                let merged = remote_pagamentos.len();
                for (fornecedor_id, fornecedor_nome, pagamento) in remote_pagamentos {
                    let index = match fornecedores.iter().position(|f| f.id == fornecedor_id) {
                        Some(index) => index,
                        None => {
                            fornecedores.push(Fornecedor {
                                id: fornecedor_id,
                                nome: fornecedor_nome,
                                pagamentos: Vec::new(),
                            });
                            fornecedores.len() - 1
                        }
                    };
                    let fornecedor = &mut fornecedores[index];
                    match fornecedor.pagamento_mut(&pagamento.id) {
                        Some(existing) => *existing = pagamento,
                        None => fornecedor.pagamentos.push(pagamento),
                    }
                }
                Ok(merged)
            })
            .await
    }

    async fn mirror_ref(&self, pagamento: &PagamentoRef) {
        self.mirror(&pagamento.fornecedor_id, &pagamento.fornecedor_nome, &pagamento.pagamento)
            .await;
    }

    async fn mirror(&self, fornecedor_id: &str, fornecedor_nome: &str, pagamento: &Pagamento) {
        let Some(remote) = self.repo.remote() else {
            return;
        };
        if !is_valid_uuid_local(&pagamento.id) {
            warn!("Not mirroring payment {}: remote rows are keyed by UUID", pagamento.id);
            return;
        }
        let mut payload = match serde_json::to_value(pagamento) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize payment {}: {}", pagamento.id, e);
                return;
            }
        };
        if let Value::Object(map) = &mut payload {
            map.insert("fornecedorId".to_string(), Value::from(fornecedor_id));
            map.insert("fornecedorNome".to_string(), Value::from(fornecedor_nome));
        }
        if let Err(e) = remote.upsert(PAGAMENTOS_TABLE, &pagamento.id, &payload).await {
            warn!("Failed to mirror payment {}: {}", pagamento.id, e);
        }
    }

    async fn unmirror(&self, pagamento_id: &str) {
        if let Some(remote) = self.repo.remote() {
            if let Err(e) = remote.delete(PAGAMENTOS_TABLE, pagamento_id).await {
                warn!("Failed to delete mirrored payment {}: {}", pagamento_id, e);
            }
        }
    }
}
