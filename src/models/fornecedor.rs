//! Suppliers and the payments they own.

use super::{dates, workflow::Workflow};
use crate::errors::{Error, Result};
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between entries appended to `Pagamento::observacoes`.
pub const OBSERVACAO_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fornecedor {
    pub id: String,
    pub nome: String,
    #[serde(default)]
    pub pagamentos: Vec<Pagamento>,
}

impl Fornecedor {
    pub fn new(nome: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            nome: nome.into(),
            pagamentos: Vec::new(),
        }
    }

    #[must_use]
    pub fn pagamento(&self, pagamento_id: &str) -> Option<&Pagamento> {
        self.pagamentos.iter().find(|p| p.id == pagamento_id)
    }

    pub fn pagamento_mut(&mut self, pagamento_id: &str) -> Option<&mut Pagamento> {
        self.pagamentos.iter_mut().find(|p| p.id == pagamento_id)
    }
}

impl Record for Fornecedor {
    const STORAGE_KEY: &'static str = keys::FORNECEDORES;
    const ENTITY: &'static str = "Fornecedor";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoPagamento {
    Pendente,
    Pago,
    Atrasado,
    Cancelado,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetodoPagamento {
    #[serde(rename = "transferencia", alias = "transferência")]
    Transferencia,
    #[serde(rename = "cheque")]
    Cheque,
    #[serde(rename = "débito direto", alias = "debito direto")]
    DebitoDireto,
    #[serde(rename = "fundo de maneio")]
    FundoManeio,
    #[serde(rename = "outro")]
    Outro,
}

impl fmt::Display for MetodoPagamento {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transferencia => "transferência",
            Self::Cheque => "cheque",
            Self::DebitoDireto => "débito direto",
            Self::FundoManeio => "fundo de maneio",
            Self::Outro => "outro",
        };
        f.write_str(label)
    }
}

/// Document type backing a payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoDocumento {
    #[default]
    Fatura,
    Cotacao,
    Vd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcaoHistorico {
    Create,
    Update,
    Delete,
}

/// One audit-log line on a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricoEntry {
    pub id: String,
    #[serde(with = "dates::iso")]
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub action: AcaoHistorico,
    #[serde(default)]
    pub details: String,
}

impl HistoricoEntry {
    pub fn new(username: impl Into<String>, action: AcaoHistorico, details: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            username: username.into(),
            action,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagamento {
    pub id: String,
    pub referencia: String,
    pub valor: f64,
    #[serde(with = "dates::iso")]
    pub data_vencimento: DateTime<Utc>,
    #[serde(default, with = "dates::iso_option", skip_serializing_if = "Option::is_none")]
    pub data_pagamento: Option<DateTime<Utc>>,
    pub estado: EstadoPagamento,
    pub metodo: MetodoPagamento,
    #[serde(default)]
    pub departamento: String,
    #[serde(default)]
    pub tipo: TipoDocumento,
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub observacoes: String,
    /// Id of the petty-cash movement that settled this payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fundo_maneio_id: Option<String>,
    /// Set on the synthetic payments created by a petty-cash replenishment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reposicao_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    #[serde(default)]
    pub historico: Vec<HistoricoEntry>,
}

impl Pagamento {
    /// A pending bank-transfer invoice with a fresh id.
    pub fn new(referencia: impl Into<String>, valor: f64, data_vencimento: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            referencia: referencia.into(),
            valor,
            data_vencimento,
            data_pagamento: None,
            estado: EstadoPagamento::Pendente,
            metodo: MetodoPagamento::Transferencia,
            departamento: String::new(),
            tipo: TipoDocumento::Fatura,
            descricao: String::new(),
            observacoes: String::new(),
            fundo_maneio_id: None,
            reposicao_id: None,
            workflow: None,
            historico: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_pago(&self) -> bool {
        self.estado == EstadoPagamento::Pago
    }

    /// Records the payment as settled at `when`.
    pub fn mark_pago(&mut self, when: DateTime<Utc>) {
        self.estado = EstadoPagamento::Pago;
        self.data_pagamento = Some(when);
    }

    pub fn append_observacao(&mut self, text: &str) {
        if self.observacoes.trim().is_empty() {
            self.observacoes = text.to_string();
        } else {
            self.observacoes = format!("{}{OBSERVACAO_SEPARATOR}{text}", self.observacoes);
        }
    }

    /// Checks the field-level invariants of a payment.
    ///
    /// # Errors
    /// Returns `Error::Validation` for an empty reference, a non-positive
    /// amount, or a paid payment without a payment date.
    pub fn validate(&self) -> Result<()> {
        if self.referencia.trim().is_empty() {
            return Err(Error::validation("Payment reference cannot be empty"));
        }
        if !self.valor.is_finite() || self.valor <= 0.0 {
            return Err(Error::validation(format!(
                "Payment amount must be positive, got {}",
                self.valor
            )));
        }
        if self.is_pago() && self.data_pagamento.is_none() {
            return Err(Error::validation(format!(
                "Payment '{}' is marked as paid without a payment date",
                self.referencia
            )));
        }
        Ok(())
    }
}
