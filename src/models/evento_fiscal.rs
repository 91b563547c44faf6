use super::dates;
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fiscal calendar entry, optionally tied to a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventoFiscal {
    pub id: String,
    pub titulo: String,
    #[serde(with = "dates::iso")]
    pub data: DateTime<Utc>,
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub concluido: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_id: Option<String>,
}

impl Record for EventoFiscal {
    const STORAGE_KEY: &'static str = keys::EVENTOS_FISCAIS;
    const ENTITY: &'static str = "EventoFiscal";

    fn id(&self) -> &str {
        &self.id
    }
}
