//! Debt, supplier statement and revenue summaries.
//!
//! Pure functions over loaded records. They return structured data and leave
//! formatting to the caller.

use crate::models::{EstadoPagamento, EstadoReceita, Fornecedor, Pagamento, Receita, TipoDocumento};
use chrono::{DateTime, Utc};

/// Outstanding invoice debt owed to one supplier.
#[derive(Debug, Clone, PartialEq)]
pub struct DividaFornecedor {
    /// Supplier id
    pub fornecedor_id: String,
    /// Supplier name
    pub nome: String,
    /// Sum of pending invoices not yet due
    pub pendente: f64,
    /// Sum of late invoices
    pub atrasado: f64,
    /// Number of open invoices
    pub quantidade: usize,
}

impl DividaFornecedor {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.pendente + self.atrasado
    }
}

/// Open invoice debt per supplier, largest first. Suppliers with nothing
/// outstanding are left out.
#[must_use]
pub fn divida_por_fornecedor(fornecedores: &[Fornecedor]) -> Vec<DividaFornecedor> {
    let mut linhas: Vec<DividaFornecedor> = fornecedores
        .iter()
        .filter_map(|fornecedor| {
            let mut linha = DividaFornecedor {
                fornecedor_id: fornecedor.id.clone(),
                nome: fornecedor.nome.clone(),
                pendente: 0.0,
                atrasado: 0.0,
                quantidade: 0,
            };
            for pagamento in fornecedor
                .pagamentos
                .iter()
                .filter(|p| p.tipo == TipoDocumento::Fatura)
            {
                match pagamento.estado {
                    EstadoPagamento::Pendente => linha.pendente += pagamento.valor,
                    EstadoPagamento::Atrasado => linha.atrasado += pagamento.valor,
                    EstadoPagamento::Pago | EstadoPagamento::Cancelado => continue,
                }
                linha.quantidade += 1;
            }
            (linha.quantidade > 0).then_some(linha)
        })
        .collect();

    linhas.sort_by(|a, b| b.total().total_cmp(&a.total()));
    linhas
}

/// A supplier's payments over a period.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtratoFornecedor {
    pub fornecedor_id: String,
    pub nome: String,
    pub pagamentos: Vec<Pagamento>,
    /// Sum of every listed payment
    pub valor_total: f64,
    /// Sum of the paid ones
    pub valor_pago: f64,
    /// `valor_total - valor_pago`
    pub saldo: f64,
}

/// Date a payment counts on in a statement: when it was paid, or its due date
/// while unpaid.
fn data_referencia(pagamento: &Pagamento) -> DateTime<Utc> {
    pagamento.data_pagamento.unwrap_or(pagamento.data_vencimento)
}

/// Statement of `fornecedor`'s payments whose reference date falls within
/// `inicio..=fim`, in stored order. An inverted range lists nothing.
///
/// # Arguments
/// * `fornecedor` - The supplier, with its payments loaded
/// * `inicio` - First instant of the period, inclusive
/// * `fim` - Last instant of the period, inclusive
#[must_use]
pub fn extrato_fornecedor(fornecedor: &Fornecedor, inicio: DateTime<Utc>, fim: DateTime<Utc>) -> ExtratoFornecedor {
    let pagamentos: Vec<Pagamento> = fornecedor
        .pagamentos
        .iter()
        .filter(|p| (inicio..=fim).contains(&data_referencia(p)))
        .cloned()
        .collect();

    let valor_total = pagamentos.iter().map(|p| p.valor).sum::<f64>();
    let valor_pago = pagamentos
        .iter()
        .filter(|p| p.estado == EstadoPagamento::Pago)
        .map(|p| p.valor)
        .sum::<f64>();

    ExtratoFornecedor {
        fornecedor_id: fornecedor.id.clone(),
        nome: fornecedor.nome.clone(),
        pagamentos,
        valor_total,
        valor_pago,
        saldo: valor_total - valor_pago,
    }
}

/// Revenue totals by state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumoReceitas {
    pub prevista: f64,
    pub recebida: f64,
    pub atrasada: f64,
    pub cancelada: f64,
}

impl ResumoReceitas {
    /// Expected plus received plus late; cancelled revenue is excluded.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.prevista + self.recebida + self.atrasada
    }
}

#[must_use]
pub fn resumo_receitas(receitas: &[Receita]) -> ResumoReceitas {
    receitas
        .iter()
        .fold(ResumoReceitas::default(), |mut resumo, receita| {
            match receita.estado {
                EstadoReceita::Prevista => resumo.prevista += receita.valor,
                EstadoReceita::Recebida => resumo.recebida += receita.valor,
                EstadoReceita::Atrasada => resumo.atrasada += receita.valor,
                EstadoReceita::Cancelada => resumo.cancelada += receita.valor,
            }
            resumo
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::date;

    fn pagamento(valor: f64, estado: EstadoPagamento, tipo: TipoDocumento) -> Pagamento {
        let mut p = Pagamento::new("FT", valor, date(2024, 1, 1));
        p.tipo = tipo;
        if estado == EstadoPagamento::Pago {
            p.mark_pago(date(2024, 1, 2));
        } else {
            p.estado = estado;
        }
        p
    }

    #[test]
    fn test_divida_por_fornecedor() {
        let mut acme = Fornecedor::new("Acme");
        acme.pagamentos = vec![
            pagamento(100.0, EstadoPagamento::Pendente, TipoDocumento::Fatura),
            pagamento(50.0, EstadoPagamento::Atrasado, TipoDocumento::Fatura),
            pagamento(70.0, EstadoPagamento::Pago, TipoDocumento::Fatura),
            pagamento(900.0, EstadoPagamento::Pendente, TipoDocumento::Cotacao),
        ];
        let mut beta = Fornecedor::new("Beta");
        beta.pagamentos = vec![pagamento(400.0, EstadoPagamento::Atrasado, TipoDocumento::Fatura)];
        let mut quitado = Fornecedor::new("Quitado");
        quitado.pagamentos = vec![pagamento(10.0, EstadoPagamento::Pago, TipoDocumento::Fatura)];

        let linhas = divida_por_fornecedor(&[acme, beta, quitado]);
        assert_eq!(linhas.len(), 2);
        assert_eq!(linhas[0].nome, "Beta");
        assert_eq!(linhas[1].nome, "Acme");
        assert_eq!(linhas[1].pendente, 100.0);
        assert_eq!(linhas[1].atrasado, 50.0);
        assert_eq!(linhas[1].quantidade, 2);
        assert_eq!(linhas[1].total(), 150.0);
    }

    #[test]
    fn test_extrato_fornecedor_range_and_due_date_fallback() {
        let mut acme = Fornecedor::new("Acme");

        // Paid on the first day of the period, though due before it
        let mut pago_no_inicio = Pagamento::new("FT-1", 100.0, date(2023, 12, 20));
        pago_no_inicio.mark_pago(date(2024, 1, 1));
        // Unpaid, counted on its due date, the last day of the period
        let vence_no_fim = Pagamento::new("FT-2", 40.0, date(2024, 1, 31));
        // Due inside the period but paid after it
        let mut pago_depois = Pagamento::new("FT-3", 25.0, date(2024, 1, 15));
        pago_depois.mark_pago(date(2024, 2, 3));
        // Unpaid and due after the period
        let vence_depois = Pagamento::new("FT-4", 60.0, date(2024, 2, 1));
        acme.pagamentos = vec![pago_no_inicio, vence_no_fim, pago_depois, vence_depois];

        let extrato = extrato_fornecedor(&acme, date(2024, 1, 1), date(2024, 1, 31));
        let referencias: Vec<&str> = extrato.pagamentos.iter().map(|p| p.referencia.as_str()).collect();
        assert_eq!(referencias, ["FT-1", "FT-2"]);
        assert_eq!(extrato.nome, "Acme");
        assert_eq!(extrato.valor_total, 140.0);
        assert_eq!(extrato.valor_pago, 100.0);
        assert_eq!(extrato.saldo, 40.0);

        let fevereiro = extrato_fornecedor(&acme, date(2024, 2, 1), date(2024, 2, 29));
        assert_eq!(fevereiro.pagamentos.len(), 2);
        assert_eq!(fevereiro.valor_pago, 25.0);
        assert_eq!(fevereiro.saldo, 60.0);

        let invertido = extrato_fornecedor(&acme, date(2024, 1, 31), date(2024, 1, 1));
        assert!(invertido.pagamentos.is_empty());
        assert_eq!(invertido.saldo, 0.0);
    }

    #[test]
    fn test_resumo_receitas() {
        let mut recebida = Receita::new("a", 10.0, date(2024, 1, 1));
        recebida.estado = EstadoReceita::Recebida;
        let mut cancelada = Receita::new("b", 5.0, date(2024, 1, 1));
        cancelada.estado = EstadoReceita::Cancelada;
        let prevista = Receita::new("c", 20.0, date(2024, 1, 1));

        let resumo = resumo_receitas(&[recebida, cancelada, prevista]);
        assert_eq!(resumo.recebida, 10.0);
        assert_eq!(resumo.cancelada, 5.0);
        assert_eq!(resumo.total(), 30.0);
    }
}
