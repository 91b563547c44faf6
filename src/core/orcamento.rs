//! Monthly budget forecasts and their comparison with actual payments.

use crate::{
    errors::{Error, Result},
    models::{EstadoPagamento, Fornecedor, ItemOrcamento, Orcamento, TipoDocumento},
    storage::{Repository, Store},
};
use chrono::Datelike;
use std::collections::BTreeMap;

/// Forecast against actual spending for one department.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparacaoDepartamento {
    pub departamento: String,
    pub previsto: f64,
    pub realizado: f64,
}

impl ComparacaoDepartamento {
    /// Positive when spending is under the forecast.
    #[must_use]
    pub fn diferenca(&self) -> f64 {
        self.previsto - self.realizado
    }
}

#[derive(Debug, Clone)]
pub struct OrcamentoService {
    repo: Repository<Orcamento>,
}

fn validate_periodo(ano: i32, mes: u32) -> Result<()> {
    if !(1..=12).contains(&mes) {
        return Err(Error::validation(format!("Invalid month {mes}")));
    }
    if ano < 1900 {
        return Err(Error::validation(format!("Invalid year {ano}")));
    }
    Ok(())
}

fn validate_item(item: &ItemOrcamento) -> Result<()> {
    if item.departamento.trim().is_empty() {
        return Err(Error::validation("Budget item needs a department"));
    }
    if !item.valor_previsto.is_finite() || item.valor_previsto < 0.0 {
        return Err(Error::validation(format!(
            "Budget amount cannot be negative, got {}",
            item.valor_previsto
        )));
    }
    Ok(())
}

impl OrcamentoService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
        }
    }

    pub async fn list(&self) -> Vec<Orcamento> {
        self.repo.list().await
    }

    pub async fn get(&self, ano: i32, mes: u32) -> Option<Orcamento> {
        self.repo.find(|o| o.ano == ano && o.mes == mes).await
    }

    /// Adds an item to the budget of `ano`/`mes`, creating the budget if
    /// needed.
    ///
    /// # Errors
    /// Returns `Error::Validation` for an invalid period or item.
    pub async fn add_item(&self, ano: i32, mes: u32, item: ItemOrcamento) -> Result<Orcamento> {
        validate_periodo(ano, mes)?;
        validate_item(&item)?;
        self.repo
            .mutate(move |orcamentos| {
                let index = match orcamentos.iter().position(|o| o.ano == ano && o.mes == mes) {
                    Some(index) => index,
                    None => {
                        orcamentos.push(Orcamento {
                            id: uuid::Uuid::new_v4().to_string(),
                            ano,
                            mes,
                            itens: Vec::new(),
                        });
                        orcamentos.len() - 1
                    }
                };
                orcamentos[index].itens.push(item);
                Ok(orcamentos[index].clone())
            })
            .await
    }

    /// # Errors
    /// Returns `Error::Validation` for an invalid item and `Error::NotFound`
    /// if the budget or item does not exist.
    pub async fn update_item(&self, orcamento_id: &str, item: ItemOrcamento) -> Result<Orcamento> {
        validate_item(&item)?;
        self.repo
            .mutate(move |orcamentos| {
                let orcamento = orcamentos
                    .iter_mut()
                    .find(|o| o.id == orcamento_id)
                    .ok_or_else(|| Error::not_found("Orcamento", orcamento_id))?;
                let slot = orcamento
                    .itens
                    .iter_mut()
                    .find(|i| i.id == item.id)
                    .ok_or_else(|| Error::not_found("ItemOrcamento", item.id.as_str()))?;
                *slot = item;
                Ok(orcamento.clone())
            })
            .await
    }

    /// Removes an item. A budget left without items is removed too, in which
    /// case `None` is returned.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the budget or item does not exist.
    pub async fn delete_item(&self, orcamento_id: &str, item_id: &str) -> Result<Option<Orcamento>> {
        self.repo
            .mutate(|orcamentos| {
                let index = orcamentos
                    .iter()
                    .position(|o| o.id == orcamento_id)
                    .ok_or_else(|| Error::not_found("Orcamento", orcamento_id))?;
                let orcamento = &mut orcamentos[index];
                let before = orcamento.itens.len();
                orcamento.itens.retain(|i| i.id != item_id);
                if orcamento.itens.len() == before {
                    return Err(Error::not_found("ItemOrcamento", item_id));
                }
                if orcamento.itens.is_empty() {
                    orcamentos.remove(index);
                    return Ok(None);
                }
                Ok(Some(orcamento.clone()))
            })
            .await
    }

    /// Forecast against actual invoice payments for `ano`/`mes`, by
    /// department. A payment counts in the month of its payment date, or of
    /// its due date while unpaid; cancelled payments are ignored.
    pub async fn comparar(&self, ano: i32, mes: u32, fornecedores: &[Fornecedor]) -> Vec<ComparacaoDepartamento> {
        let mut linhas: BTreeMap<String, ComparacaoDepartamento> = BTreeMap::new();

        if let Some(orcamento) = self.get(ano, mes).await {
            for item in orcamento.itens {
                linhas
                    .entry(item.departamento.clone())
                    .or_insert_with(|| ComparacaoDepartamento {
                        departamento: item.departamento.clone(),
                        previsto: 0.0,
                        realizado: 0.0,
                    })
                    .previsto += item.valor_previsto;
            }
        }

        let pagamentos = fornecedores
            .iter()
            .flat_map(|f| f.pagamentos.iter())
            .filter(|p| p.tipo == TipoDocumento::Fatura)
            .filter(|p| p.estado != EstadoPagamento::Cancelado);
        for pagamento in pagamentos {
            let referencia = pagamento.data_pagamento.unwrap_or(pagamento.data_vencimento);
            if referencia.year() != ano || referencia.month() != mes {
                continue;
            }
            linhas
                .entry(pagamento.departamento.clone())
                .or_insert_with(|| ComparacaoDepartamento {
                    departamento: pagamento.departamento.clone(),
                    previsto: 0.0,
                    realizado: 0.0,
                })
                .realizado += pagamento.valor;
        }

        linhas.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::models::Pagamento;
    use crate::test_utils::{date, setup_test_store};

    fn item(departamento: &str, valor: f64) -> ItemOrcamento {
        ItemOrcamento {
            id: uuid::Uuid::new_v4().to_string(),
            departamento: departamento.to_string(),
            valor_previsto: valor,
            descricao: String::new(),
        }
    }

    #[tokio::test]
    async fn test_items_share_one_budget_per_month() -> Result<()> {
        let service = OrcamentoService::new(setup_test_store().await?);
        service.add_item(2024, 3, item("Biblioteca", 100.0)).await?;
        let orcamento = service.add_item(2024, 3, item("Reitoria", 50.0)).await?;
        assert_eq!(orcamento.itens.len(), 2);
        assert_eq!(orcamento.total_previsto(), 150.0);
        assert_eq!(service.list().await.len(), 1);

        let invalid = service.add_item(2024, 13, item("X", 1.0)).await;
        assert!(matches!(invalid, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_last_item_drops_budget() -> Result<()> {
        let service = OrcamentoService::new(setup_test_store().await?);
        let only = item("Biblioteca", 100.0);
        let orcamento = service.add_item(2024, 3, only.clone()).await?;

        assert!(service.delete_item(&orcamento.id, &only.id).await?.is_none());
        assert!(service.list().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_comparar_by_department() -> Result<()> {
        let service = OrcamentoService::new(setup_test_store().await?);
        service.add_item(2024, 3, item("Biblioteca", 100.0)).await?;

        let mut fornecedor = Fornecedor::new("Livraria");
        let mut paga = Pagamento::new("FT-1", 80.0, date(2024, 2, 28));
        paga.departamento = "Biblioteca".to_string();
        paga.mark_pago(date(2024, 3, 2));
        let mut pendente = Pagamento::new("FT-2", 30.0, date(2024, 3, 20));
        pendente.departamento = "Informática".to_string();
        let mut cotacao = Pagamento::new("CT-1", 999.0, date(2024, 3, 20));
        cotacao.departamento = "Biblioteca".to_string();
        cotacao.tipo = TipoDocumento::Cotacao;
        fornecedor.pagamentos = vec![paga, pendente, cotacao];

        let linhas = service.comparar(2024, 3, &[fornecedor]).await;
        assert_eq!(linhas.len(), 2);
        assert_eq!(linhas[0].departamento, "Biblioteca");
        assert_eq!(linhas[0].realizado, 80.0);
        assert_eq!(linhas[0].diferenca(), 20.0);
        assert_eq!(linhas[1].departamento, "Informática");
        assert_eq!(linhas[1].previsto, 0.0);
        assert_eq!(linhas[1].realizado, 30.0);
        Ok(())
    }
}
