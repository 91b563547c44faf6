use super::dates;
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoReceita {
    Prevista,
    Recebida,
    Atrasada,
    Cancelada,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receita {
    pub id: String,
    pub descricao: String,
    pub valor: f64,
    #[serde(with = "dates::iso")]
    pub data_previsao: DateTime<Utc>,
    #[serde(default, with = "dates::iso_option", skip_serializing_if = "Option::is_none")]
    pub data_recebimento: Option<DateTime<Utc>>,
    pub estado: EstadoReceita,
    #[serde(default)]
    pub cliente: String,
    #[serde(default)]
    pub categoria: String,
    #[serde(default)]
    pub metodo: String,
    #[serde(default)]
    pub documento_fiscal: bool,
    #[serde(default)]
    pub reconciliado: bool,
    #[serde(default)]
    pub observacoes: String,
}

impl Receita {
    pub fn new(descricao: impl Into<String>, valor: f64, data_previsao: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            descricao: descricao.into(),
            valor,
            data_previsao,
            data_recebimento: None,
            estado: EstadoReceita::Prevista,
            cliente: String::new(),
            categoria: String::new(),
            metodo: String::new(),
            documento_fiscal: false,
            reconciliado: false,
            observacoes: String::new(),
        }
    }

    /// The state this revenue should be in at `now`, per the overdue and
    /// late-receipt rules.
    #[must_use]
    pub fn estado_derivado(&self, now: DateTime<Utc>) -> EstadoReceita {
        match self.estado {
            EstadoReceita::Prevista if self.data_recebimento.is_none() && self.data_previsao < now => {
                EstadoReceita::Atrasada
            }
            EstadoReceita::Atrasada if self.data_recebimento.is_some() => EstadoReceita::Recebida,
            other => other,
        }
    }
}

impl Record for Receita {
    const STORAGE_KEY: &'static str = keys::RECEITAS;
    const REMOTE_TABLE: Option<&'static str> = Some("receitas");
    const ENTITY: &'static str = "Receita";

    fn id(&self) -> &str {
        &self.id
    }
}
