//! Petty-cash ledgers, one per calendar month.
//!
//! Ledgers form a chain: each month opens with the closing balance of the
//! latest earlier month. A change dated in any month re-chains every later
//! ledger, and is refused if it would leave any of them negative, so a
//! backdated debit cannot spend cash a later month already spent.
//!
//! Every mutation reloads the ledgers, applies the change and writes back
//! while holding the service's writer lock, so two concurrent debits can
//! never both pass the funds check against the same balance.

use crate::{
    errors::{Error, Result},
    models::{FundoManeioMensal, Movimento, TipoMovimento, dates},
    storage::{Repository, Store},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FundoManeioService {
    repo: Repository<FundoManeioMensal>,
    writer: Arc<Mutex<()>>,
}

/// Opening balance for a new ledger covering `mes`: the closing balance of the
/// latest earlier ledger, or zero.
fn carried_balance(ledgers: &[FundoManeioMensal], mes: &DateTime<Utc>) -> f64 {
    ledgers
        .iter()
        .filter(|l| l.mes < *mes)
        .max_by_key(|l| l.mes)
        .map_or(0.0, |l| l.saldo_final)
}

/// Index of the ledger covering `date`, opening it if needed.
fn ensure_ledger(ledgers: &mut Vec<FundoManeioMensal>, date: &DateTime<Utc>) -> usize {
    if let Some(index) = ledgers.iter().position(|l| l.covers(date)) {
        return index;
    }
    let mes = dates::month_start(date);
    let ledger = FundoManeioMensal::new(mes, carried_balance(ledgers, &mes));
    info!(
        "Opened petty-cash ledger for {} with {:.2}",
        mes.format("%Y-%m"),
        ledger.saldo_inicial
    );
    ledgers.push(ledger);
    ledgers.sort_by_key(|l| l.mes);
    ledgers.iter().position(|l| l.covers(date)).unwrap_or(0)
}

/// Sorts the ledgers by month and chains each opening balance to the
/// previous closing balance. The oldest ledger keeps its own opening balance.
fn rechain(ledgers: &mut [FundoManeioMensal]) {
    ledgers.sort_by_key(|l| l.mes);
    let mut carried: Option<f64> = None;
    for ledger in ledgers.iter_mut() {
        if let Some(saldo) = carried {
            if (ledger.saldo_inicial - saldo).abs() > f64::EPSILON {
                debug!(
                    "Re-chained {} opening balance {:.2} -> {:.2}",
                    ledger.mes.format("%Y-%m"),
                    ledger.saldo_inicial,
                    saldo
                );
            }
            ledger.saldo_inicial = saldo;
        }
        ledger.recalcular();
        carried = Some(ledger.saldo_final);
    }
}

/// Cash that can leave the fund on `date` without leaving that month or any
/// later month negative. Expects a chained slice.
fn available_from(ledgers: &[FundoManeioMensal], date: &DateTime<Utc>) -> f64 {
    let mes = dates::month_start(date);
    let floor = if ledgers.iter().any(|l| l.covers(date)) {
        f64::INFINITY
    } else {
        carried_balance(ledgers, &mes)
    };
    ledgers
        .iter()
        .filter(|l| l.mes >= mes)
        .map(|l| l.saldo_final)
        .fold(floor, f64::min)
}

impl FundoManeioService {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// All ledgers, oldest month first.
    pub async fn ledgers(&self) -> Vec<FundoManeioMensal> {
        let mut ledgers = self.repo.list().await;
        ledgers.sort_by_key(|l| l.mes);
        ledgers
    }

    /// The ledger covering the month of `date`, if it was opened.
    pub async fn ledger_for(&self, date: &DateTime<Utc>) -> Option<FundoManeioMensal> {
        self.repo.find(|l| l.covers(date)).await
    }

    /// Opens the ledger for the month of `date`, carrying the previous
    /// closing balance. Returns the existing ledger if already open.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn open_month(&self, date: &DateTime<Utc>) -> Result<FundoManeioMensal> {
        let _writer = self.writer.lock().await;
        self.repo
            .mutate(|ledgers| {
                rechain(ledgers);
                let index = ensure_ledger(ledgers, date);
                Ok(ledgers[index].clone())
            })
            .await
    }

    /// Records a petty-cash movement in the ledger for its month.
    ///
    /// The ledger is opened if this is the month's first movement. Every later
    /// ledger is re-chained afterwards, so a backdated movement shifts the
    /// opening and closing balances of all the months after it.
    ///
    /// # Arguments
    /// * `movimento` - The movement to record. Its `data` picks the ledger
    ///   and its `valor` must be positive.
    ///
    /// # Returns
    /// The ledger the movement landed in, as stored after the change, and the
    /// movement itself.
    ///
    /// # Errors
    /// Returns `Error::Validation` for a non-positive amount and
    /// `Error::InsufficientFunds` if a debit exceeds the cash available from
    /// its month onwards. The ledgers are left unchanged in both cases.
    pub async fn add_movimento(&self, movimento: Movimento) -> Result<(FundoManeioMensal, Movimento)> {
        if !movimento.valor.is_finite() || movimento.valor <= 0.0 {
            return Err(Error::validation(format!(
                "Movement amount must be positive, got {}",
                movimento.valor
            )));
        }

        let _writer = self.writer.lock().await;
        self.repo
            .mutate(move |ledgers| {
                rechain(ledgers);
                let available = available_from(ledgers, &movimento.data);
                if movimento.tipo == TipoMovimento::Saida && movimento.valor > available {
                    return Err(Error::InsufficientFunds {
                        current: available,
                        required: movimento.valor,
                    });
                }

                let index = ensure_ledger(ledgers, &movimento.data);
                ledgers[index].movimentos.push(movimento.clone());
                rechain(ledgers);

                let ledger = ledgers
                    .iter()
                    .find(|l| l.covers(&movimento.data))
                    .cloned()
                    .ok_or_else(|| Error::not_found("FundoManeio", movimento.data.format("%Y-%m").to_string()))?;
                debug!(
                    "Petty cash {:?} {:.2}, balance now {:.2}",
                    movimento.tipo, movimento.valor, ledger.saldo_final
                );
                Ok((ledger, movimento))
            })
            .await
    }

    /// Removes a movement that settles no payment and re-chains the ledgers.
    ///
    /// Movements linked to a payment go through
    /// [`crate::core::sync::Synchronizer::delete_movimento`], which also clears
    /// the payment's back-reference.
    ///
    /// # Arguments
    /// * `movimento_id` - Id of the movement to remove.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no ledger holds the movement,
    /// `Error::Validation` if it is linked to a payment, and
    /// `Error::InsufficientFunds` if removing a credit would leave its month or
    /// a later one negative.
    pub async fn delete_movimento(&self, movimento_id: &str) -> Result<Movimento> {
        self.remove_movimento(movimento_id, false).await
    }

    /// Like [`Self::delete_movimento`], but also removes payment-linked
    /// movements. The caller owns the payment's back-reference.
    pub(crate) async fn delete_linked_movimento(&self, movimento_id: &str) -> Result<Movimento> {
        self.remove_movimento(movimento_id, true).await
    }

    async fn remove_movimento(&self, movimento_id: &str, allow_linked: bool) -> Result<Movimento> {
        let _writer = self.writer.lock().await;
        self.repo
            .mutate(|ledgers| {
                rechain(ledgers);
                let (index, pos) = ledgers
                    .iter()
                    .enumerate()
                    .find_map(|(i, l)| {
                        l.movimentos
                            .iter()
                            .position(|m| m.id == movimento_id)
                            .map(|pos| (i, pos))
                    })
                    .ok_or_else(|| Error::not_found("Movimento", movimento_id))?;

                let movimento = &ledgers[index].movimentos[pos];
                if !allow_linked {
                    if let Some(pagamento_id) = movimento.pagamento_id.as_deref() {
                        return Err(Error::validation(format!(
                            "Movement {movimento_id} settles payment {pagamento_id}"
                        )));
                    }
                }
                if movimento.tipo == TipoMovimento::Entrada {
                    let available = available_from(ledgers, &movimento.data);
                    if movimento.valor > available {
                        return Err(Error::InsufficientFunds {
                            current: available,
                            required: movimento.valor,
                        });
                    }
                }

                let removed = ledgers[index].movimentos.remove(pos);
                rechain(ledgers);
                Ok(removed)
            })
            .await
    }

    /// Opens the month after `mes` with `mes`'s closing balance.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if `mes` has no ledger and
    /// `Error::Validation` if the next month is already open.
    pub async fn transportar_saldo(&self, mes: &DateTime<Utc>) -> Result<FundoManeioMensal> {
        let _writer = self.writer.lock().await;
        self.repo
            .mutate(|ledgers| {
                rechain(ledgers);
                let current = ledgers
                    .iter()
                    .find(|l| l.covers(mes))
                    .ok_or_else(|| Error::not_found("FundoManeio", mes.format("%Y-%m").to_string()))?;
                let saldo = current.saldo_final;
                let next = dates::next_month_start(&current.mes);

                if ledgers.iter().any(|l| l.covers(&next)) {
                    return Err(Error::validation(format!(
                        "Ledger for {} is already open",
                        next.format("%Y-%m")
                    )));
                }

                let ledger = FundoManeioMensal::new(next, saldo);
                ledgers.push(ledger.clone());
                rechain(ledgers);
                info!("Carried {:.2} into {}", saldo, next.format("%Y-%m"));
                Ok(ledger)
            })
            .await
    }

    /// Cuts the link between `pagamento_id` and its movement, keeping the
    /// movement. Returns the detached movement, if there was one.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn detach_pagamento(&self, pagamento_id: &str) -> Result<Option<Movimento>> {
        let _writer = self.writer.lock().await;
        self.repo
            .mutate(|ledgers| {
                Ok(ledgers
                    .iter_mut()
                    .flat_map(|l| l.movimentos.iter_mut())
                    .find(|m| m.pagamento_id.as_deref() == Some(pagamento_id))
                    .map(|m| {
                        m.detach();
                        m.clone()
                    }))
            })
            .await
    }

    /// The movement settling `pagamento_id`, if any.
    pub async fn find_by_pagamento(&self, pagamento_id: &str) -> Option<Movimento> {
        self.repo
            .load_local()
            .await
            .into_iter()
            .flat_map(|l| l.movimentos)
            .find(|m| m.pagamento_id.as_deref() == Some(pagamento_id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::{date, setup_test_store};

    async fn funded(saldo: f64) -> Result<FundoManeioService> {
        let service = FundoManeioService::new(setup_test_store().await?);
        service
            .add_movimento(Movimento::new(date(2024, 1, 2), TipoMovimento::Entrada, saldo, "abertura"))
            .await?;
        Ok(service)
    }

    fn assert_balanced(ledger: &FundoManeioMensal) {
        let expected = ledger.saldo_inicial + ledger.total(TipoMovimento::Entrada)
            - ledger.total(TipoMovimento::Saida);
        assert!((ledger.saldo_final - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_balance_tracks_movements() -> Result<()> {
        let service = funded(1000.0).await?;
        let (ledger, _) = service
            .add_movimento(Movimento::new(date(2024, 1, 5), TipoMovimento::Saida, 300.0, "papel"))
            .await?;
        assert_eq!(ledger.saldo_final, 700.0);
        assert_balanced(&ledger);

        let (_, entrada) = service
            .add_movimento(Movimento::new(date(2024, 1, 6), TipoMovimento::Entrada, 50.0, "troco"))
            .await?;
        service.delete_movimento(&entrada.id).await?;

        let ledger = service.ledger_for(&date(2024, 1, 31)).await.unwrap();
        assert_eq!(ledger.saldo_final, 700.0);
        assert_balanced(&ledger);
        Ok(())
    }

    #[tokio::test]
    async fn test_overdraft_is_rejected_and_ledger_unchanged() -> Result<()> {
        let service = funded(100.0).await?;
        let before = service.ledgers().await;

        let result = service
            .add_movimento(Movimento::new(date(2024, 1, 9), TipoMovimento::Saida, 100.01, "excesso"))
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(service.ledgers().await, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_new_month_carries_previous_balance() -> Result<()> {
        let service = funded(400.0).await?;
        let (feb, _) = service
            .add_movimento(Movimento::new(date(2024, 2, 3), TipoMovimento::Saida, 150.0, "táxi"))
            .await?;
        assert_eq!(feb.saldo_inicial, 400.0);
        assert_eq!(feb.saldo_final, 250.0);
        assert_eq!(service.ledgers().await.len(), 2);

        let march = service.open_month(&date(2024, 3, 15)).await?;
        assert_eq!(march.saldo_inicial, 250.0);
        assert_eq!(service.open_month(&date(2024, 3, 1)).await?.id, march.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_backdated_debit_cannot_spend_later_months_cash() -> Result<()> {
        let service = funded(400.0).await?;
        service
            .add_movimento(Movimento::new(date(2024, 2, 3), TipoMovimento::Saida, 100.0, "táxi"))
            .await?;

        // January still shows 400, but February has already spent 100 of it
        let result = service
            .add_movimento(Movimento::new(date(2024, 1, 20), TipoMovimento::Saida, 400.0, "tinteiros"))
            .await;
        match result {
            Err(Error::InsufficientFunds { current, required }) => {
                assert_eq!(current, 300.0);
                assert_eq!(required, 400.0);
            }
            other => panic!("expected insufficient funds, got {other:?}"),
        }

        let (jan, _) = service
            .add_movimento(Movimento::new(date(2024, 1, 20), TipoMovimento::Saida, 300.0, "tinteiros"))
            .await?;
        assert_eq!(jan.saldo_final, 100.0);

        let ledgers = service.ledgers().await;
        assert_eq!(ledgers[1].saldo_inicial, ledgers[0].saldo_final);
        assert_eq!(ledgers[1].saldo_final, 0.0);
        ledgers.iter().for_each(assert_balanced);

        let over = service
            .add_movimento(Movimento::new(date(2024, 2, 10), TipoMovimento::Saida, 300.0, "papel"))
            .await;
        assert!(matches!(over, Err(Error::InsufficientFunds { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_backdated_credit_flows_into_later_months() -> Result<()> {
        let service = funded(100.0).await?;
        service.open_month(&date(2024, 3, 1)).await?;
        service
            .add_movimento(Movimento::new(date(2024, 1, 25), TipoMovimento::Entrada, 50.0, "reforço"))
            .await?;

        let march = service.ledger_for(&date(2024, 3, 1)).await.unwrap();
        assert_eq!(march.saldo_inicial, 150.0);
        assert_eq!(march.saldo_final, 150.0);

        // A February opened between them carries the same balance
        let february = service.open_month(&date(2024, 2, 14)).await?;
        assert_eq!(february.saldo_inicial, 150.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_spent_credit_is_refused() -> Result<()> {
        let service = funded(100.0).await?;
        let entrada = service.ledgers().await[0].movimentos[0].clone();
        service
            .add_movimento(Movimento::new(date(2024, 1, 5), TipoMovimento::Saida, 80.0, "papel"))
            .await?;
        let before = service.ledgers().await;

        let result = service.delete_movimento(&entrada.id).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(service.ledgers().await, before);
        assert_eq!(before[0].saldo_final, 20.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_credit_checks_later_months() -> Result<()> {
        let service = funded(100.0).await?;
        let (_, reforco) = service
            .add_movimento(Movimento::new(date(2024, 1, 8), TipoMovimento::Entrada, 60.0, "reforço"))
            .await?;
        service
            .add_movimento(Movimento::new(date(2024, 2, 2), TipoMovimento::Saida, 120.0, "obras"))
            .await?;

        // January alone would stay at 100, but February would drop to -20
        let result = service.delete_movimento(&reforco.id).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        service
            .add_movimento(Movimento::new(date(2024, 2, 3), TipoMovimento::Entrada, 20.0, "troco"))
            .await?;
        service.delete_movimento(&reforco.id).await?;
        let ledgers = service.ledgers().await;
        assert_eq!(ledgers[0].saldo_final, 100.0);
        assert_eq!(ledgers[1].saldo_inicial, 100.0);
        assert_eq!(ledgers[1].saldo_final, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_linked_movement_cannot_be_deleted_directly() -> Result<()> {
        let service = funded(100.0).await?;
        let mut saida = Movimento::new(date(2024, 1, 4), TipoMovimento::Saida, 40.0, "fornecedor");
        saida.pagamento_id = Some("p1".to_string());
        let (_, saida) = service.add_movimento(saida).await?;

        let result = service.delete_movimento(&saida.id).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert!(service.find_by_pagamento("p1").await.is_some());

        let missing = service.delete_movimento("nope").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_transportar_saldo() -> Result<()> {
        let service = funded(80.0).await?;
        let next = service.transportar_saldo(&date(2024, 1, 20)).await?;
        assert_eq!(next.mes, date(2024, 2, 1));
        assert_eq!(next.saldo_inicial, 80.0);

        let again = service.transportar_saldo(&date(2024, 1, 20)).await;
        assert!(matches!(again, Err(Error::Validation { .. })));

        let missing = service.transportar_saldo(&date(2023, 6, 1)).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_debits_cannot_overdraw() -> Result<()> {
        let service = funded(500.0).await?;
        let a = service.clone();
        let b = service.clone();

        let (ra, rb) = tokio::join!(
            a.add_movimento(Movimento::new(date(2024, 1, 10), TipoMovimento::Saida, 300.0, "a")),
            b.add_movimento(Movimento::new(date(2024, 1, 10), TipoMovimento::Saida, 300.0, "b")),
        );
        assert_eq!(usize::from(ra.is_ok()) + usize::from(rb.is_ok()), 1);

        let ledger = service.ledger_for(&date(2024, 1, 1)).await.unwrap();
        assert_eq!(ledger.saldo_final, 200.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_detach_pagamento_keeps_movement() -> Result<()> {
        let service = funded(100.0).await?;
        let mut saida = Movimento::new(date(2024, 1, 4), TipoMovimento::Saida, 40.0, "fornecedor");
        saida.pagamento_id = Some("p1".to_string());
        service.add_movimento(saida).await?;

        let detached = service.detach_pagamento("p1").await?.unwrap();
        assert!(detached.pagamento_id.is_none());
        assert!(service.find_by_pagamento("p1").await.is_none());
        let ledger = service.ledger_for(&date(2024, 1, 1)).await.unwrap();
        assert_eq!(ledger.movimentos.len(), 2);
        assert_eq!(ledger.saldo_final, 60.0);
        Ok(())
    }
}
