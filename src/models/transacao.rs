use super::{dates, fornecedor::MetodoPagamento};
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoTransacao {
    #[default]
    Debito,
    Credito,
}

/// A bank reconciliation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransacaoBancaria {
    pub id: String,
    #[serde(with = "dates::iso")]
    pub data: DateTime<Utc>,
    pub descricao: String,
    pub valor: f64,
    #[serde(default)]
    pub tipo: TipoTransacao,
    #[serde(default)]
    pub reconciliado: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheque_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheque_numero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reposicao_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metodo: Option<MetodoPagamento>,
}

impl TransacaoBancaria {
    /// An unreconciled debit with a fresh id.
    pub fn debito(data: DateTime<Utc>, descricao: impl Into<String>, valor: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data,
            descricao: descricao.into(),
            valor,
            tipo: TipoTransacao::Debito,
            reconciliado: false,
            pagamento_id: None,
            cheque_id: None,
            cheque_numero: None,
            reposicao_id: None,
            metodo: None,
        }
    }
}

impl Record for TransacaoBancaria {
    const STORAGE_KEY: &'static str = keys::TRANSACOES_BANCARIAS;
    const ENTITY: &'static str = "TransacaoBancaria";

    fn id(&self) -> &str {
        &self.id
    }
}
