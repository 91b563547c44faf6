//! Business logic services.
//!
//! Each service owns a [`crate::storage::Repository`] for one collection and
//! reloads it before every mutation. The [`sync::Synchronizer`] and the
//! [`workflow::WorkflowEngine`] compose the entity services; nothing here
//! depends on a UI.

/// Fiscal calendar
pub mod calendario;
/// Cheque register
pub mod cheque;
/// Suppliers and payments
pub mod fornecedor;
/// Monthly petty-cash ledgers
pub mod fundo_maneio;
/// Notification sink and inbox
pub mod notification;
/// Budget forecasts
pub mod orcamento;
/// Revenues
pub mod receita;
/// Debt and revenue summaries
pub mod report;
/// Cross-entity synchronization
pub mod sync;
/// Bank reconciliation entries
pub mod transacao;
/// Users and permissions
pub mod user;
/// Payment approval workflow
pub mod workflow;
