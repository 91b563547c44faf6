use super::dates;
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoCheque {
    Pendente,
    Compensado,
    Cancelado,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cheque {
    pub id: String,
    pub numero: String,
    pub valor: f64,
    pub beneficiario: String,
    #[serde(with = "dates::iso")]
    pub data_emissao: DateTime<Utc>,
    #[serde(default, with = "dates::iso_option", skip_serializing_if = "Option::is_none")]
    pub data_compensacao: Option<DateTime<Utc>>,
    pub estado: EstadoCheque,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_referencia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fornecedor_nome: Option<String>,
}

impl Cheque {
    /// A pending cheque with a fresh id and no payment link.
    pub fn new(
        numero: impl Into<String>,
        valor: f64,
        beneficiario: impl Into<String>,
        data_emissao: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            numero: numero.into(),
            valor,
            beneficiario: beneficiario.into(),
            data_emissao,
            data_compensacao: None,
            estado: EstadoCheque::Pendente,
            pagamento_id: None,
            pagamento_referencia: None,
            fornecedor_nome: None,
        }
    }

    /// Cuts the link to the payment, keeping the cheque itself.
    pub fn detach(&mut self) {
        self.pagamento_id = None;
        self.pagamento_referencia = None;
    }
}

impl Record for Cheque {
    const STORAGE_KEY: &'static str = keys::CHEQUES;
    const REMOTE_TABLE: Option<&'static str> = Some("cheques");
    const ENTITY: &'static str = "Cheque";

    fn id(&self) -> &str {
        &self.id
    }
}
