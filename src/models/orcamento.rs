use crate::storage::{Record, keys};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOrcamento {
    pub id: String,
    pub departamento: String,
    pub valor_previsto: f64,
    #[serde(default)]
    pub descricao: String,
}

/// Budget forecast for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orcamento {
    pub id: String,
    pub ano: i32,
    /// 1-based month.
    pub mes: u32,
    #[serde(default)]
    pub itens: Vec<ItemOrcamento>,
}

impl Orcamento {
    #[must_use]
    pub fn total_previsto(&self) -> f64 {
        self.itens.iter().map(|i| i.valor_previsto).sum()
    }
}

impl Record for Orcamento {
    const STORAGE_KEY: &'static str = keys::ORCAMENTOS;
    const ENTITY: &'static str = "Orcamento";

    fn id(&self) -> &str {
        &self.id
    }
}
