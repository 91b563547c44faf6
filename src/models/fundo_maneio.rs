//! Monthly petty-cash ledgers.

use super::dates;
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoMovimento {
    Entrada,
    Saida,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movimento {
    pub id: String,
    #[serde(with = "dates::iso")]
    pub data: DateTime<Utc>,
    pub tipo: TipoMovimento,
    pub valor: f64,
    #[serde(default)]
    pub descricao: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagamento_referencia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fornecedor_nome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reposicao_id: Option<String>,
}

impl Movimento {
    pub fn new(data: DateTime<Utc>, tipo: TipoMovimento, valor: f64, descricao: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data,
            tipo,
            valor,
            descricao: descricao.into(),
            pagamento_id: None,
            pagamento_referencia: None,
            fornecedor_nome: None,
            reposicao_id: None,
        }
    }

    /// Signed effect on the balance.
    #[must_use]
    pub fn efeito(&self) -> f64 {
        match self.tipo {
            TipoMovimento::Entrada => self.valor,
            TipoMovimento::Saida => -self.valor,
        }
    }

    pub fn detach(&mut self) {
        self.pagamento_id = None;
        self.pagamento_referencia = None;
        self.fornecedor_nome = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundoManeioMensal {
    pub id: String,
    /// First instant of the ledger's month.
    #[serde(with = "dates::iso")]
    pub mes: DateTime<Utc>,
    #[serde(default)]
    pub movimentos: Vec<Movimento>,
    pub saldo_inicial: f64,
    pub saldo_final: f64,
}

impl FundoManeioMensal {
    /// An empty ledger for the month containing `mes`.
    pub fn new(mes: DateTime<Utc>, saldo_inicial: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mes: dates::month_start(&mes),
            movimentos: Vec::new(),
            saldo_inicial,
            saldo_final: saldo_inicial,
        }
    }

    /// Balance implied by the movements.
    #[must_use]
    pub fn saldo_calculado(&self) -> f64 {
        self.saldo_inicial + self.movimentos.iter().map(Movimento::efeito).sum::<f64>()
    }

    pub fn recalcular(&mut self) {
        self.saldo_final = self.saldo_calculado();
    }

    #[must_use]
    pub fn covers(&self, date: &DateTime<Utc>) -> bool {
        dates::same_month(&self.mes, date)
    }

    #[must_use]
    pub fn total(&self, tipo: TipoMovimento) -> f64 {
        self.movimentos
            .iter()
            .filter(|m| m.tipo == tipo)
            .map(|m| m.valor)
            .sum()
    }
}

impl Record for FundoManeioMensal {
    const STORAGE_KEY: &'static str = keys::FUNDOS_MANEIO;
    const ENTITY: &'static str = "FundoManeio";

    fn id(&self) -> &str {
        &self.id
    }
}
