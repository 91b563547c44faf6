//! Persisted domain records.
//!
//! Field names serialize in camelCase to match the stored JSON documents.

pub mod cheque;
pub mod dates;
pub mod evento_fiscal;
pub mod fornecedor;
pub mod fundo_maneio;
pub mod notification;
pub mod orcamento;
pub mod receita;
pub mod transacao;
pub mod user;
pub mod workflow;

pub use cheque::{Cheque, EstadoCheque};
pub use evento_fiscal::EventoFiscal;
pub use fornecedor::{
    AcaoHistorico, EstadoPagamento, Fornecedor, HistoricoEntry, MetodoPagamento, Pagamento,
    TipoDocumento,
};
pub use fundo_maneio::{FundoManeioMensal, Movimento, TipoMovimento};
pub use notification::{BROADCAST, Notification};
pub use orcamento::{ItemOrcamento, Orcamento};
pub use receita::{EstadoReceita, Receita};
pub use transacao::{TipoTransacao, TransacaoBancaria};
pub use user::{Role, User};
pub use workflow::{
    StepStatus, Workflow, WorkflowConfig, WorkflowStatus, WorkflowStep, WorkflowStepConfig,
};
