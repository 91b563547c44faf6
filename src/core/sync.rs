//! Cross-entity synchronization.
//!
//! Keeps payments, cheques, petty-cash movements, bank transactions and the
//! fiscal calendar consistent when a payment's method or state changes. Each
//! operation validates and performs its primary write first; a failure there
//! aborts with nothing written. The follow-up writes (bank transaction, fiscal
//! calendar, back-reference cleanup) are independent steps: a failing step is
//! logged and the operation carries on. There is no rollback across entities.

use super::{
    calendario::CalendarioService,
    cheque::ChequeService,
    fornecedor::{FornecedorService, PagamentoRef},
    fundo_maneio::FundoManeioService,
    transacao::TransacaoService,
    user::UserService,
};
use crate::{
    errors::{Error, Result},
    models::{
        Cheque, Fornecedor, MetodoPagamento, Movimento, Pagamento, TipoMovimento,
        TransacaoBancaria, dates,
    },
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{error, info, instrument, warn};

/// Supplier that owns the synthetic replenishment payments.
pub const FORNECEDOR_FUNDO_MANEIO: &str = "Fundo de Maneio";

static CHEQUE_NUMERO_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)cheque\s+n[º°o]?\.?\s*(\d+)",
        r"(?i)\bch\s+n[º°o]?\.?\s*(\d+)",
        r"(?i)\bch\.?\s*(\d+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Best-effort extraction of a cheque number from free text.
#[must_use]
pub fn extrair_numero_cheque(texto: &str) -> Option<String> {
    CHEQUE_NUMERO_PATTERNS
        .iter()
        .find_map(|re| re.captures(texto))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// An action the caller should offer the user after a change.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPrompt {
    /// A paid cheque payment has no cheque registered yet.
    IssueCheque {
        fornecedor_id: String,
        pagamento_id: String,
        referencia: String,
        valor: f64,
    },
}

/// Result of [`Synchronizer::edit_pagamento`].
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub pagamento: PagamentoRef,
    pub prompts: Vec<SyncPrompt>,
}

/// Result of [`Synchronizer::replenish_petty_cash`].
#[derive(Debug, Clone)]
pub struct Reposicao {
    pub reposicao_id: String,
    pub pagamento: PagamentoRef,
    pub movimento: Movimento,
    pub transacao: Option<TransacaoBancaria>,
}

fn log_step<T>(step: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Synchronization step '{}' failed: {}", step, e);
            None
        }
    }
}

/// Debit movement settling `found` from petty cash.
fn petty_cash_debit(found: &PagamentoRef, descricao: Option<&str>, when: DateTime<Utc>) -> Movimento {
    let pagamento = &found.pagamento;
    let descricao = descricao
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(
            || format!("Pagamento {} - {}", pagamento.referencia, found.fornecedor_nome),
            ToString::to_string,
        );
    let mut movimento = Movimento::new(when, TipoMovimento::Saida, pagamento.valor, descricao);
    movimento.pagamento_id = Some(pagamento.id.clone());
    movimento.pagamento_referencia = Some(pagamento.referencia.clone());
    movimento.fornecedor_nome = Some(found.fornecedor_nome.clone());
    movimento
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    fornecedores: FornecedorService,
    cheques: ChequeService,
    fundos: FundoManeioService,
    transacoes: TransacaoService,
    calendario: CalendarioService,
    users: UserService,
}

impl Synchronizer {
    #[must_use]
    pub const fn new(
        fornecedores: FornecedorService,
        cheques: ChequeService,
        fundos: FundoManeioService,
        transacoes: TransacaoService,
        calendario: CalendarioService,
        users: UserService,
    ) -> Self {
        Self {
            fornecedores,
            cheques,
            fundos,
            transacoes,
            calendario,
            users,
        }
    }

    /// Prompts for a cheque when a paid payment uses the cheque method but
    /// none is registered. Never creates one.
    pub async fn on_payment_method_changed_to_cheque_pending(
        &self,
        fornecedor_id: &str,
        pagamento: &Pagamento,
    ) -> Option<SyncPrompt> {
        if pagamento.metodo != MetodoPagamento::Cheque || !pagamento.is_pago() {
            return None;
        }
        if self.cheques.find_by_pagamento(&pagamento.id).await.is_some() {
            return None;
        }
        Some(SyncPrompt::IssueCheque {
            fornecedor_id: fornecedor_id.to_string(),
            pagamento_id: pagamento.id.clone(),
            referencia: pagamento.referencia.clone(),
            valor: pagamento.valor,
        })
    }

    /// Registers a pending cheque for a payment and notes it on the payment.
    /// The payment's state is left as is.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist and
    /// `Error::Validation` for an empty number or if the payment already has a
    /// cheque.
    #[instrument(skip(self))]
    pub async fn issue_cheque(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        numero: &str,
        data_emissao: DateTime<Utc>,
    ) -> Result<Cheque> {
        let found = self.fornecedores.require_pagamento(fornecedor_id, pagamento_id).await?;
        let pagamento = &found.pagamento;

        let mut cheque = Cheque::new(numero.trim(), pagamento.valor, &found.fornecedor_nome, data_emissao);
        cheque.pagamento_id = Some(pagamento.id.clone());
        cheque.pagamento_referencia = Some(pagamento.referencia.clone());
        cheque.fornecedor_nome = Some(found.fornecedor_nome.clone());
        let cheque = self.cheques.add_cheque(cheque).await?;

        let actor = self.users.actor().await;
        let nota = format!(
            "Cheque nº {} emitido em {}",
            cheque.numero,
            dates::format_pt(&cheque.data_emissao)
        );
        log_step(
            "annotate payment with cheque",
            self.fornecedores
                .modify_pagamento(fornecedor_id, pagamento_id, &actor, &nota, |p| {
                    p.metodo = MetodoPagamento::Cheque;
                    p.append_observacao(&nota);
                    Ok(())
                })
                .await,
        );

        info!("Issued cheque {} for payment {}", cheque.numero, pagamento.referencia);
        Ok(cheque)
    }

    /// Clears a cheque now. See [`Self::compensar_cheque_at`].
    ///
    /// # Errors
    /// Same as [`Self::compensar_cheque_at`].
    pub async fn compensar_cheque(&self, cheque_id: &str) -> Result<Cheque> {
        self.compensar_cheque_at(cheque_id, Utc::now()).await
    }

    /// Clears a cheque at `when`, settles its payment and records one bank
    /// transaction for it.
    ///
    /// The cheque is the primary write. Its linked payment, if still unpaid, is
    /// marked paid at the clearing date with a note in its observations, and
    /// the payment's fiscal events are completed. The bank transaction has the
    /// id `cheque-{id}`, so clearing again is harmless and adds nothing; it is
    /// reconciled only when the cheque is linked to an existing payment.
    ///
    /// # Arguments
    /// * `cheque_id` - The cheque to clear
    /// * `when` - Clearing date; a cheque cleared before keeps its first date
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the cheque does not exist and
    /// `Error::Validation` if it was cancelled.
    #[instrument(skip(self))]
    pub async fn compensar_cheque_at(&self, cheque_id: &str, when: DateTime<Utc>) -> Result<Cheque> {
        let cheque = self.cheques.compensar(cheque_id, when).await?;
        let compensado_em = cheque.data_compensacao.unwrap_or(when);

        let linked = match cheque.pagamento_id.as_deref() {
            Some(pagamento_id) => self.fornecedores.find_pagamento(pagamento_id).await,
            None => None,
        };

        if let Some(found) = &linked {
            if found.pagamento.is_pago() {
                info!("Payment {} already settled", found.pagamento.referencia);
            } else {
                let actor = self.users.actor().await;
                let nota = format!(
                    "Cheque nº {} compensado em {}",
                    cheque.numero,
                    dates::format_pt(&compensado_em)
                );
                log_step(
                    "settle payment of cleared cheque",
                    self.fornecedores
                        .modify_pagamento(&found.fornecedor_id, &found.pagamento.id, &actor, &nota, |p| {
                            p.mark_pago(compensado_em);
                            p.append_observacao(&nota);
                            Ok(())
                        })
                        .await,
                );
            }
            log_step(
                "complete fiscal events",
                self.calendario.concluir_por_pagamento(&found.pagamento.id).await,
            );
        } else if let Some(pagamento_id) = cheque.pagamento_id.as_deref() {
            warn!("Cheque {} references missing payment {}", cheque.numero, pagamento_id);
        }

        let mut transacao = TransacaoBancaria::debito(
            compensado_em,
            format!("Cheque nº {} - {}", cheque.numero, cheque.beneficiario),
            cheque.valor,
        );
        transacao.id = format!("cheque-{}", cheque.id);
        transacao.reconciliado = linked.is_some();
        transacao.pagamento_id = linked.as_ref().map(|l| l.pagamento.id.clone());
        transacao.cheque_id = Some(cheque.id.clone());
        transacao.cheque_numero = Some(cheque.numero.clone());
        transacao.metodo = Some(MetodoPagamento::Cheque);
        if let Some(false) = log_step(
            "record cheque transaction",
            self.transacoes.insert_for_cheque(transacao).await,
        ) {
            info!("Cheque {} already has a bank transaction", cheque.numero);
        }

        Ok(cheque)
    }

    /// Pays now from the petty-cash ledger. See [`Self::pay_with_petty_cash_at`].
    ///
    /// # Errors
    /// Same as [`Self::pay_with_petty_cash_at`].
    pub async fn pay_with_petty_cash(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        descricao: Option<&str>,
    ) -> Result<Movimento> {
        self.pay_with_petty_cash_at(fornecedor_id, pagamento_id, descricao, Utc::now())
            .await
    }

    /// Pays a payment from the ledger of `when`'s month: appends a debit
    /// movement linked to the payment and marks the payment as paid by petty
    /// cash.
    ///
    /// The debit is checked against the cash available from `when`'s month
    /// onwards, so a backdated payment cannot spend cash a later month has
    /// already used.
    ///
    /// # Arguments
    /// * `fornecedor_id` - Supplier owning the payment
    /// * `pagamento_id` - The payment to settle
    /// * `descricao` - Movement description; defaults to
    ///   `"Pagamento {referencia} - {fornecedor}"`
    /// * `when` - Payment date, which also picks the ledger
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist,
    /// `Error::Validation` if it was already paid from petty cash, and
    /// `Error::InsufficientFunds` if the ledger cannot cover it. Nothing is
    /// written in any of these cases.
    #[instrument(skip(self, descricao))]
    pub async fn pay_with_petty_cash_at(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        descricao: Option<&str>,
        when: DateTime<Utc>,
    ) -> Result<Movimento> {
        let found = self.fornecedores.require_pagamento(fornecedor_id, pagamento_id).await?;
        let pagamento = &found.pagamento;
        if pagamento.fundo_maneio_id.is_some() {
            return Err(Error::validation(format!(
                "Payment {} is already paid from petty cash",
                pagamento.referencia
            )));
        }

        let movimento = petty_cash_debit(&found, descricao, when);
        let (ledger, movimento) = self.fundos.add_movimento(movimento).await?;

        let actor = self.users.actor().await;
        let nota = format!("Pago com Fundo de Maneio em {}", dates::format_pt(&when));
        let movimento_id = movimento.id.clone();
        log_step(
            "mark payment paid by petty cash",
            self.fornecedores
                .modify_pagamento(fornecedor_id, pagamento_id, &actor, &nota, |p| {
                    p.mark_pago(when);
                    p.metodo = MetodoPagamento::FundoManeio;
                    p.fundo_maneio_id = Some(movimento_id);
                    p.append_observacao(&nota);
                    Ok(())
                })
                .await,
        );
        log_step(
            "complete fiscal events",
            self.calendario.concluir_por_pagamento(pagamento_id).await,
        );

        info!(
            "Paid {} ({:.2}) from petty cash, balance {:.2}",
            pagamento.referencia, pagamento.valor, ledger.saldo_final
        );
        Ok(movimento)
    }

    /// Tops up the petty-cash ledger of `data`'s month. Records a paid
    /// transfer from the "Fundo de Maneio" supplier, a credit movement and a
    /// bank transaction, all tagged with the same replenishment id.
    ///
    /// # Arguments
    /// * `valor` - Amount added to the fund
    /// * `descricao` - Description for the movement and transaction; blank
    ///   uses "Reposição de Fundo de Maneio"
    /// * `data` - Replenishment date; the payment reference is `REP-YYYYMMDD`
    ///
    /// # Errors
    /// Returns `Error::Validation` for a non-positive amount.
    #[instrument(skip(self))]
    pub async fn replenish_petty_cash(&self, valor: f64, descricao: &str, data: DateTime<Utc>) -> Result<Reposicao> {
        if !valor.is_finite() || valor <= 0.0 {
            return Err(Error::validation(format!(
                "Replenishment amount must be positive, got {valor}"
            )));
        }
        let reposicao_id = uuid::Uuid::new_v4().to_string();
        let descricao = if descricao.trim().is_empty() {
            "Reposição de Fundo de Maneio".to_string()
        } else {
            descricao.trim().to_string()
        };

        let mut pagamento = Pagamento::new(format!("REP-{}", data.format("%Y%m%d")), valor, data);
        pagamento.mark_pago(data);
        pagamento.metodo = MetodoPagamento::Transferencia;
        pagamento.departamento = "Tesouraria".to_string();
        pagamento.descricao.clone_from(&descricao);
        pagamento.observacoes = "Reposição de Fundo de Maneio".to_string();
        pagamento.reposicao_id = Some(reposicao_id.clone());

        let actor = self.users.actor().await;
        let pagamento = self
            .fornecedores
            .add_pagamento(FORNECEDOR_FUNDO_MANEIO, pagamento, &actor)
            .await?;

        let mut movimento = Movimento::new(data, TipoMovimento::Entrada, valor, descricao.clone());
        movimento.reposicao_id = Some(reposicao_id.clone());
        let (ledger, movimento) = self.fundos.add_movimento(movimento).await?;

        let mut transacao = TransacaoBancaria::debito(data, format!("Reposição de Fundo de Maneio - {descricao}"), valor);
        transacao.reposicao_id = Some(reposicao_id.clone());
        transacao.pagamento_id = Some(pagamento.pagamento.id.clone());
        transacao.metodo = Some(MetodoPagamento::Transferencia);
        let transacao = log_step(
            "record replenishment transaction",
            self.transacoes.add(transacao).await,
        );

        info!("Replenished petty cash with {:.2}, balance {:.2}", valor, ledger.saldo_final);
        Ok(Reposicao {
            reposicao_id,
            pagamento,
            movimento,
            transacao,
        })
    }

    /// Cuts the back-reference a payment held through its previous method.
    /// The cheque or movement itself is kept.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist.
    pub async fn detach_method(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        previous: MetodoPagamento,
    ) -> Result<()> {
        let found = self.fornecedores.require_pagamento(fornecedor_id, pagamento_id).await?;
        self.detach_links(&found.pagamento, previous).await;

        if previous == MetodoPagamento::FundoManeio && found.pagamento.fundo_maneio_id.is_some() {
            let actor = self.users.actor().await;
            log_step(
                "clear petty-cash link on payment",
                self.fornecedores
                    .modify_pagamento(
                        fornecedor_id,
                        pagamento_id,
                        &actor,
                        "Ligação ao Fundo de Maneio removida",
                        |p| {
                            p.fundo_maneio_id = None;
                            Ok(())
                        },
                    )
                    .await,
            );
        }
        Ok(())
    }

    async fn detach_links(&self, pagamento: &Pagamento, previous: MetodoPagamento) {
        match previous {
            MetodoPagamento::Cheque => {
                if let Some(Some(cheque)) = log_step(
                    "detach cheque",
                    self.cheques.detach_pagamento(&pagamento.id).await,
                ) {
                    info!("Detached cheque {} from {}", cheque.numero, pagamento.referencia);
                }
            }
            MetodoPagamento::FundoManeio => {
                if let Some(Some(movimento)) = log_step(
                    "detach petty-cash movement",
                    self.fundos.detach_pagamento(&pagamento.id).await,
                ) {
                    info!("Detached movement {} from {}", movimento.id, pagamento.referencia);
                }
            }
            _ => {}
        }
    }

    /// Marks a payment as paid now. See [`Self::mark_as_paid_at`].
    ///
    /// # Errors
    /// Same as [`Self::mark_as_paid_at`].
    pub async fn mark_as_paid(&self, fornecedor_id: &str, pagamento_id: &str) -> Result<PagamentoRef> {
        self.mark_as_paid_at(fornecedor_id, pagamento_id, Utc::now()).await
    }

    /// Marks a payment as paid at `when`, records its bank transaction for
    /// cheque and transfer payments, and completes its fiscal events.
    ///
    /// The transaction id is `pag-{pagamento_id}`, so marking again replaces
    /// it instead of adding another. A cheque payment's transaction names the
    /// payment's own cheque when one is registered, otherwise a number found
    /// in its observations.
    ///
    /// # Arguments
    /// * `fornecedor_id` - Supplier owning the payment
    /// * `pagamento_id` - The payment to settle
    /// * `when` - Payment date
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist.
    #[instrument(skip(self))]
    pub async fn mark_as_paid_at(
        &self,
        fornecedor_id: &str,
        pagamento_id: &str,
        when: DateTime<Utc>,
    ) -> Result<PagamentoRef> {
        let actor = self.users.actor().await;
        let updated = self
            .fornecedores
            .modify_pagamento(fornecedor_id, pagamento_id, &actor, "Pagamento marcado como pago", |p| {
                p.mark_pago(when);
                Ok(())
            })
            .await?;

        self.record_settlement(&updated).await;
        Ok(updated)
    }

    /// Bank transaction and fiscal calendar follow-up for a settled payment.
    async fn record_settlement(&self, found: &PagamentoRef) {
        let pagamento = &found.pagamento;
        let data = pagamento.data_pagamento.unwrap_or_else(Utc::now);

        let transacao = match pagamento.metodo {
            MetodoPagamento::Cheque => {
                let numero = extrair_numero_cheque(&pagamento.observacoes);
                let cheque = match self.cheques.find_by_pagamento(&pagamento.id).await {
                    Some(cheque) => Some(cheque),
                    None => match numero.as_deref() {
                        // Another payment's cheque with the same number is not ours
                        Some(numero) => self.cheques.find_by_numero(numero).await.filter(|c| {
                            c.pagamento_id.as_deref().is_none_or(|id| id == pagamento.id)
                        }),
                        None => None,
                    },
                };
                let numero = cheque.as_ref().map(|c| c.numero.clone()).or(numero);
                let descricao = match numero.as_deref() {
                    Some(n) => format!("Pagamento {} - Cheque nº {n}", pagamento.referencia),
                    None => format!("Pagamento {} - Cheque", pagamento.referencia),
                };
                let mut t = TransacaoBancaria::debito(data, descricao, pagamento.valor);
                t.cheque_id = cheque.map(|c| c.id);
                t.cheque_numero = numero;
                Some(t)
            }
            MetodoPagamento::Transferencia => Some(TransacaoBancaria::debito(
                data,
                format!(
                    "Pagamento {} - Transferência - {}",
                    pagamento.referencia, found.fornecedor_nome
                ),
                pagamento.valor,
            )),
            _ => None,
        };

        if let Some(mut t) = transacao {
            t.id = format!("pag-{}", pagamento.id);
            t.reconciliado = true;
            t.pagamento_id = Some(pagamento.id.clone());
            t.metodo = Some(pagamento.metodo);
            log_step("record payment transaction", self.transacoes.upsert_for_pagamento(t).await);
        }

        log_step(
            "complete fiscal events",
            self.calendario.concluir_por_pagamento(&pagamento.id).await,
        );
    }

    /// Applies an edit to a payment and keeps its cheque and petty-cash links
    /// consistent with the new method.
    ///
    /// A payment switched to petty cash while paid gets its debit movement
    /// first, so an uncovered amount aborts the edit with nothing written.
    /// Links held through the previous method are cut. Becoming paid records
    /// the bank transaction. A paid cheque payment without a cheque yields an
    /// [`SyncPrompt::IssueCheque`].
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist,
    /// `Error::Validation` if the edited payment is invalid, and
    /// `Error::InsufficientFunds` if a new petty-cash payment is not covered.
    #[instrument(skip(self, edited), fields(pagamento_id = %edited.id))]
    pub async fn edit_pagamento(&self, fornecedor_id: &str, mut edited: Pagamento) -> Result<EditOutcome> {
        let previous = self.fornecedores.require_pagamento(fornecedor_id, &edited.id).await?;
        edited.validate()?;
        let metodo_anterior = previous.pagamento.metodo;
        let metodo_mudou = metodo_anterior != edited.metodo;

        if metodo_mudou && metodo_anterior == MetodoPagamento::FundoManeio {
            edited.fundo_maneio_id = None;
        } else if !metodo_mudou && edited.fundo_maneio_id.is_none() {
            edited.fundo_maneio_id.clone_from(&previous.pagamento.fundo_maneio_id);
        }

        if edited.metodo == MetodoPagamento::FundoManeio && edited.is_pago() && edited.fundo_maneio_id.is_none() {
            let quando = edited.data_pagamento.unwrap_or_else(Utc::now);
            let draft = PagamentoRef {
                pagamento: edited.clone(),
                ..previous.clone()
            };
            let (_, movimento) = self
                .fundos
                .add_movimento(petty_cash_debit(&draft, None, quando))
                .await?;
            edited.fundo_maneio_id = Some(movimento.id);
        }

        if metodo_mudou {
            self.detach_links(&previous.pagamento, metodo_anterior).await;
        }

        let actor = self.users.actor().await;
        let updated = self
            .fornecedores
            .update_pagamento(fornecedor_id, edited, &actor)
            .await?;

        if updated.pagamento.is_pago() && !previous.pagamento.is_pago() {
            self.record_settlement(&updated).await;
        }

        let prompts = self
            .on_payment_method_changed_to_cheque_pending(fornecedor_id, &updated.pagamento)
            .await
            .into_iter()
            .collect();

        Ok(EditOutcome {
            pagamento: updated,
            prompts,
        })
    }

    /// Deletes a payment after cutting its cheque and movement links. The
    /// cheque and movement themselves are kept.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist.
    #[instrument(skip(self))]
    pub async fn delete_pagamento(&self, fornecedor_id: &str, pagamento_id: &str) -> Result<Pagamento> {
        let found = self.fornecedores.require_pagamento(fornecedor_id, pagamento_id).await?;
        self.detach_links(&found.pagamento, MetodoPagamento::Cheque).await;
        self.detach_links(&found.pagamento, MetodoPagamento::FundoManeio).await;

        let removed = self.fornecedores.remove_pagamento(fornecedor_id, pagamento_id).await?;
        info!("Deleted payment {}", removed.referencia);
        Ok(removed)
    }

    /// Deletes a petty-cash movement, including one that settles a payment.
    ///
    /// The ledgers are re-chained by [`FundoManeioService`]. When the movement
    /// settled a payment, that payment's `fundo_maneio_id` is cleared and the
    /// change is recorded in its history; the payment keeps its state.
    ///
    /// # Arguments
    /// * `movimento_id` - Id of the movement to delete.
    ///
    /// # Returns
    /// The removed movement.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no ledger holds the movement and
    /// `Error::InsufficientFunds` if removing a credit would leave its month or
    /// a later one negative. Nothing is written in either case.
    #[instrument(skip(self))]
    pub async fn delete_movimento(&self, movimento_id: &str) -> Result<Movimento> {
        let removed = self.fundos.delete_linked_movimento(movimento_id).await?;
        let Some(pagamento_id) = removed.pagamento_id.as_deref() else {
            return Ok(removed);
        };

        match self.fornecedores.find_pagamento(pagamento_id).await {
            Some(found) if found.pagamento.fundo_maneio_id.as_deref() == Some(movimento_id) => {
                let actor = self.users.actor().await;
                log_step(
                    "clear petty-cash link on payment",
                    self.fornecedores
                        .modify_pagamento(
                            &found.fornecedor_id,
                            pagamento_id,
                            &actor,
                            "Movimento do Fundo de Maneio eliminado",
                            |p| {
                                p.fundo_maneio_id = None;
                                Ok(())
                            },
                        )
                        .await,
                );
            }
            Some(_) => {}
            None => warn!("Movement {} referenced missing payment {}", movimento_id, pagamento_id),
        }
        Ok(removed)
    }

    /// Deletes a supplier and all its payments, cutting every cheque and
    /// movement link first.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the supplier does not exist.
    #[instrument(skip(self))]
    pub async fn delete_fornecedor(&self, fornecedor_id: &str) -> Result<Fornecedor> {
        let fornecedor = self.fornecedores.require(fornecedor_id).await?;
        for pagamento in &fornecedor.pagamentos {
            self.detach_links(pagamento, MetodoPagamento::Cheque).await;
            self.detach_links(pagamento, MetodoPagamento::FundoManeio).await;
        }
        self.fornecedores.remove_fornecedor(fornecedor_id).await
    }
}
