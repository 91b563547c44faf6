//! Sequential multi-approver workflow attached to a payment.
//!
//! A workflow starts in progress at step 0 and moves forward one approval at
//! a time. Approving the last step settles the payment through the
//! [`Synchronizer`]; rejecting any step ends the workflow and leaves the
//! payment untouched. Approved and rejected workflows accept no further
//! transitions. Authorization is checked against the stored state on every
//! call.

use super::{fornecedor::FornecedorService, notification::NotificationSink, sync::Synchronizer};
use crate::{
    errors::{Error, Result},
    models::{
        BROADCAST, Notification, Role, StepStatus, User, Workflow, WorkflowConfig, WorkflowStatus,
    },
    storage::{Store, ensure_saved, keys},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const KIND_APPROVAL_REQUEST: &str = "payment_approval";
pub const KIND_APPROVED: &str = "payment_approved";
pub const KIND_REJECTED: &str = "payment_rejected";

/// Checks that `user` may act on the current step of `workflow`.
///
/// # Errors
/// Returns `Error::InvalidWorkflowState` if the workflow is finished and
/// `Error::Authorization` if the user is neither the step's assignee, nor
/// holds its role, nor is an admin.
pub fn can_approve(user: &User, workflow: &Workflow) -> Result<()> {
    if workflow.status.is_terminal() {
        return Err(Error::InvalidWorkflowState {
            message: format!("Workflow is already {:?}", workflow.status),
        });
    }
    let step = workflow.current().ok_or_else(|| Error::InvalidWorkflowState {
        message: format!("Workflow has no step {}", workflow.current_step),
    })?;
    if !user.is_active {
        return Err(Error::Authorization {
            message: format!("User {} is inactive", user.username),
        });
    }
    if user.role == Role::Admin || user.username == step.username || user.role == step.role {
        Ok(())
    } else {
        Err(Error::Authorization {
            message: format!(
                "User {} cannot act on the step assigned to {}",
                user.username, step.username
            ),
        })
    }
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Store,
    defaults: WorkflowConfig,
    fornecedores: FornecedorService,
    sync: Synchronizer,
    notifications: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// `defaults` applies until a configuration is saved.
    pub fn new(
        store: Store,
        defaults: WorkflowConfig,
        fornecedores: FornecedorService,
        sync: Synchronizer,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            defaults,
            fornecedores,
            sync,
            notifications,
        }
    }

    pub async fn workflow_config(&self) -> WorkflowConfig {
        self.store
            .load(keys::WORKFLOW_CONFIG, self.defaults.clone())
            .await
    }

    /// # Errors
    /// Returns `Error::Validation` for an enabled configuration without
    /// steps, and `Error::Persistence` if it cannot be saved.
    pub async fn update_workflow_config(&self, config: &WorkflowConfig) -> Result<()> {
        if config.enabled && config.steps.is_empty() {
            return Err(Error::validation("An enabled workflow needs at least one step"));
        }
        if config.steps.iter().any(|s| s.username.trim().is_empty()) {
            return Err(Error::validation("Every workflow step needs a username"));
        }
        let saved = self.store.save(keys::WORKFLOW_CONFIG, config).await;
        ensure_saved(saved, keys::WORKFLOW_CONFIG)
    }

    async fn notify(&self, notification: Notification) {
        let title = notification.title.clone();
        if let Err(e) = self.notifications.notify(notification).await {
            error!("Failed to deliver notification '{}': {}", title, e);
        }
    }

    /// Starts the approval workflow of a payment and notifies the first
    /// approver. A payment that already has a workflow keeps it; `None` is
    /// returned when workflows are disabled.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist.
    #[instrument(skip(self))]
    pub async fn initialize_workflow(&self, fornecedor_id: &str, pagamento_id: &str) -> Result<Option<Workflow>> {
        let found = self.fornecedores.require_pagamento(fornecedor_id, pagamento_id).await?;
        if let Some(existing) = found.pagamento.workflow {
            return Ok(Some(existing));
        }

        let config = self.workflow_config().await;
        if !config.enabled || config.steps.is_empty() {
            info!("Approval workflow disabled, not starting one for {}", found.pagamento.referencia);
            return Ok(None);
        }

        let workflow = Workflow::from_config(&config);
        let stored = workflow.clone();
        self.fornecedores
            .modify_pagamento(fornecedor_id, pagamento_id, "sistema", "Workflow de aprovação iniciado", |p| {
                p.workflow = Some(stored);
                Ok(())
            })
            .await?;

        if let Some(step) = workflow.current() {
            self.notify(approval_request(&step.username, &found.pagamento.referencia, pagamento_id))
                .await;
        }
        info!("Started approval workflow for {}", found.pagamento.referencia);
        Ok(Some(workflow))
    }

    /// Approves the current step now. See [`Self::approve_at`].
    ///
    /// # Errors
    /// Same as [`Self::approve_at`].
    pub async fn approve(
        &self,
        actor: &User,
        fornecedor_id: &str,
        pagamento_id: &str,
        comments: Option<&str>,
    ) -> Result<Workflow> {
        self.approve_at(actor, fornecedor_id, pagamento_id, comments, Utc::now())
            .await
    }

    /// Approves the current step at `when`.
    ///
    /// The step is stamped with the approver and comments. If more steps
    /// remain, the workflow moves to the next one and its approver gets an
    /// approval request. On the last step the workflow is approved, the
    /// payment is marked paid at `when` through the synchronizer (bank
    /// transaction and fiscal calendar included) and everyone is notified.
    ///
    /// # Arguments
    /// * `actor` - The user approving. Must be active and be the step's
    ///   assignee, hold its role, or be an admin
    /// * `fornecedor_id` - Supplier owning the payment
    /// * `pagamento_id` - The payment under approval
    /// * `comments` - Optional approval note; blank notes are dropped
    /// * `when` - Approval time, also used as the payment date on the last step
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the payment does not exist,
    /// `Error::InvalidWorkflowState` if it has no open workflow, and
    /// `Error::Authorization` if `actor` may not act on the current step.
    #[instrument(skip(self, actor, comments), fields(actor = %actor.username))]
    pub async fn approve_at(
        &self,
        actor: &User,
        fornecedor_id: &str,
        pagamento_id: &str,
        comments: Option<&str>,
        when: DateTime<Utc>,
    ) -> Result<Workflow> {
        let comments = comments.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        let details = format!("Aprovado por {}", actor.username);

        let updated = self
            .fornecedores
            .modify_pagamento(fornecedor_id, pagamento_id, &actor.username, &details, |p| {
                let referencia = p.referencia.clone();
                let workflow = p.workflow.as_mut().ok_or_else(|| Error::InvalidWorkflowState {
                    message: format!("Payment {referencia} has no approval workflow"),
                })?;
                can_approve(actor, workflow)?;
                advance(workflow, when, comments);
                Ok(())
            })
            .await?;

        let pagamento = &updated.pagamento;
        let workflow = pagamento.workflow.clone().ok_or_else(|| Error::InvalidWorkflowState {
            message: format!("Payment {} lost its workflow", pagamento.referencia),
        })?;

        if workflow.status == WorkflowStatus::Approved {
            self.sync.mark_as_paid_at(fornecedor_id, pagamento_id, when).await?;
            self.notify(Notification::new(
                BROADCAST,
                "Pagamento aprovado",
                format!(
                    "O pagamento {} ({:.2}) de {} foi aprovado",
                    pagamento.referencia, pagamento.valor, updated.fornecedor_nome
                ),
                KIND_APPROVED,
                pagamento_id,
            ))
            .await;
            info!("Payment {} approved", pagamento.referencia);
        } else if let Some(next) = workflow.current() {
            self.notify(approval_request(&next.username, &pagamento.referencia, pagamento_id))
                .await;
            info!("Payment {} advanced to step {}", pagamento.referencia, workflow.current_step);
        }

        Ok(workflow)
    }

    /// Rejects the current step now. See [`Self::reject_at`].
    ///
    /// # Errors
    /// Same as [`Self::reject_at`].
    pub async fn reject(
        &self,
        actor: &User,
        fornecedor_id: &str,
        pagamento_id: &str,
        comments: &str,
    ) -> Result<Workflow> {
        self.reject_at(actor, fornecedor_id, pagamento_id, comments, Utc::now())
            .await
    }

    /// Rejects the current step at `when`, ending the workflow. The payment's
    /// state is not changed. Everyone is notified.
    ///
    /// # Arguments
    /// * `actor` - The user rejecting, under the same rules as approval
    /// * `fornecedor_id` - Supplier owning the payment
    /// * `pagamento_id` - The payment under approval
    /// * `comments` - The reason; required
    /// * `when` - Rejection time
    ///
    /// # Errors
    /// Returns `Error::Validation` for empty comments, plus the errors of
    /// [`Self::approve_at`]. The workflow is unchanged on error.
    #[instrument(skip(self, actor, comments), fields(actor = %actor.username))]
    pub async fn reject_at(
        &self,
        actor: &User,
        fornecedor_id: &str,
        pagamento_id: &str,
        comments: &str,
        when: DateTime<Utc>,
    ) -> Result<Workflow> {
        let comments = comments.trim();
        if comments.is_empty() {
            return Err(Error::validation("A rejection needs a reason"));
        }
        let details = format!("Rejeitado por {}: {}", actor.username, comments);

        let updated = self
            .fornecedores
            .modify_pagamento(fornecedor_id, pagamento_id, &actor.username, &details, |p| {
                let referencia = p.referencia.clone();
                let workflow = p.workflow.as_mut().ok_or_else(|| Error::InvalidWorkflowState {
                    message: format!("Payment {referencia} has no approval workflow"),
                })?;
                can_approve(actor, workflow)?;
                let index = workflow.current_step;
                if let Some(step) = workflow.steps.get_mut(index) {
                    step.status = StepStatus::Rejected;
                    step.date = Some(when);
                    step.comments = Some(comments.to_string());
                }
                workflow.status = WorkflowStatus::Rejected;
                Ok(())
            })
            .await?;

        let pagamento = &updated.pagamento;
        self.notify(Notification::new(
            BROADCAST,
            "Pagamento rejeitado",
            format!(
                "O pagamento {} de {} foi rejeitado por {}: {}",
                pagamento.referencia, updated.fornecedor_nome, actor.username, comments
            ),
            KIND_REJECTED,
            pagamento_id,
        ))
        .await;
        info!("Payment {} rejected by {}", pagamento.referencia, actor.username);

        pagamento.workflow.clone().ok_or_else(|| Error::InvalidWorkflowState {
            message: format!("Payment {} lost its workflow", pagamento.referencia),
        })
    }
}

/// Marks the current step approved and moves the workflow on.
fn advance(workflow: &mut Workflow, when: DateTime<Utc>, comments: Option<String>) {
    let index = workflow.current_step;
    if let Some(step) = workflow.steps.get_mut(index) {
        step.status = StepStatus::Approved;
        step.date = Some(when);
        step.comments = comments;
    }
    if workflow.is_last_step() {
        workflow.status = WorkflowStatus::Approved;
    } else {
        workflow.current_step += 1;
    }
}

fn approval_request(username: &str, referencia: &str, pagamento_id: &str) -> Notification {
    let mut notification = Notification::new(
        username,
        "Pagamento aguardando aprovação",
        format!("O pagamento {referencia} aguarda a sua aprovação"),
        KIND_APPROVAL_REQUEST,
        pagamento_id,
    );
    notification.action_url = Some(format!("/pagamentos/{pagamento_id}"));
    notification
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::app::Tesouraria;
    use crate::core::fornecedor::PagamentoRef;
    use crate::models::EstadoPagamento;
    use crate::test_utils::{create_test_pagamento, date, setup_test_app};

    async fn user(app: &Tesouraria, username: &str) -> User {
        app.users.find_by_username(username).await.unwrap()
    }

    async fn started(app: &Tesouraria, referencia: &str) -> Result<PagamentoRef> {
        let created = create_test_pagamento(app, "Construções Norte", referencia, 5000.0).await?;
        app.workflow
            .initialize_workflow(&created.fornecedor_id, &created.pagamento.id)
            .await?
            .unwrap();
        Ok(created)
    }

    #[tokio::test]
    async fn test_two_step_approval() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-900").await?;
        let (fid, pid) = (&created.fornecedor_id, &created.pagamento.id);

        let pedidos = app.notifications.for_user("diretora.financeira").await;
        assert_eq!(pedidos.len(), 1);
        assert_eq!(pedidos[0].kind, KIND_APPROVAL_REQUEST);
        assert_eq!(pedidos[0].action_url.as_deref(), Some(format!("/pagamentos/{pid}").as_str()));

        let diretora = user(&app, "diretora.financeira").await;
        let workflow = app
            .workflow
            .approve_at(&diretora, fid, pid, Some("ok"), date(2024, 2, 1))
            .await?;
        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(workflow.current_step, 1);
        assert_eq!(workflow.steps[0].status, StepStatus::Approved);
        assert_eq!(workflow.steps[0].comments.as_deref(), Some("ok"));
        assert_eq!(app.notifications.for_user("reitor").await.len(), 1);

        let pagamento = app.fornecedores.find_pagamento(pid).await.unwrap().pagamento;
        assert_eq!(pagamento.estado, EstadoPagamento::Pendente);

        let reitor = user(&app, "reitor").await;
        let aprovado_em = date(2024, 2, 3);
        let workflow = app.workflow.approve_at(&reitor, fid, pid, None, aprovado_em).await?;
        assert_eq!(workflow.status, WorkflowStatus::Approved);
        assert_eq!(workflow.steps[1].date, Some(aprovado_em));

        let pagamento = app.fornecedores.find_pagamento(pid).await.unwrap().pagamento;
        assert_eq!(pagamento.estado, EstadoPagamento::Pago);
        assert_eq!(pagamento.data_pagamento, Some(aprovado_em));
        assert_eq!(pagamento.workflow.unwrap().status, WorkflowStatus::Approved);
        assert!(app.transacoes.find_by_pagamento(pid).await.is_some());

        let broadcast = app
            .notifications
            .list()
            .await
            .into_iter()
            .filter(|n| n.kind == KIND_APPROVED)
            .collect::<Vec<_>>();
        assert_eq!(broadcast.len(), 1);
        assert!(broadcast[0].is_broadcast());

        // Nothing moves after approval
        let again = app.workflow.approve_at(&reitor, fid, pid, None, aprovado_em).await;
        assert!(matches!(again, Err(Error::InvalidWorkflowState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_approver_is_refused() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-901").await?;

        let reitor = user(&app, "reitor").await;
        let result = app
            .workflow
            .approve(&reitor, &created.fornecedor_id, &created.pagamento.id, None)
            .await;
        assert!(matches!(result, Err(Error::Authorization { .. })));

        let workflow = app
            .fornecedores
            .find_pagamento(&created.pagamento.id)
            .await
            .unwrap()
            .pagamento
            .workflow
            .unwrap();
        assert_eq!(workflow.current_step, 0);
        assert_eq!(workflow.steps[0].status, StepStatus::Pending);

        // Admins may act on any step
        let admin = user(&app, "admin").await;
        let workflow = app
            .workflow
            .approve(&admin, &created.fornecedor_id, &created.pagamento.id, None)
            .await?;
        assert_eq!(workflow.current_step, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_user_is_refused() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-902").await?;

        let mut diretora = user(&app, "diretora.financeira").await;
        diretora.is_active = false;
        let result = app
            .workflow
            .approve(&diretora, &created.fornecedor_id, &created.pagamento.id, None)
            .await;
        assert!(matches!(result, Err(Error::Authorization { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_requires_comments() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-903").await?;
        let diretora = user(&app, "diretora.financeira").await;

        let result = app
            .workflow
            .reject(&diretora, &created.fornecedor_id, &created.pagamento.id, "   ")
            .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let workflow = app
            .fornecedores
            .find_pagamento(&created.pagamento.id)
            .await
            .unwrap()
            .pagamento
            .workflow
            .unwrap();
        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(workflow.steps[0].status, StepStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_ends_workflow_and_keeps_estado() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-904").await?;
        let (fid, pid) = (&created.fornecedor_id, &created.pagamento.id);
        let diretora = user(&app, "diretora.financeira").await;

        let workflow = app
            .workflow
            .reject_at(&diretora, fid, pid, "Falta a nota de encomenda", date(2024, 2, 2))
            .await?;
        assert_eq!(workflow.status, WorkflowStatus::Rejected);
        assert_eq!(workflow.steps[0].status, StepStatus::Rejected);
        assert_eq!(
            workflow.steps[0].comments.as_deref(),
            Some("Falta a nota de encomenda")
        );

        let pagamento = app.fornecedores.find_pagamento(pid).await.unwrap().pagamento;
        assert_eq!(pagamento.estado, EstadoPagamento::Pendente);
        assert!(pagamento.historico.last().unwrap().details.contains("Falta a nota"));

        // Broadcasts are visible to every user
        let rejeicoes = app.notifications.for_user("reitor").await;
        assert!(rejeicoes.iter().any(|n| n.kind == KIND_REJECTED));

        let again = app.workflow.approve(&diretora, fid, pid, None).await;
        assert!(matches!(again, Err(Error::InvalidWorkflowState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() -> Result<()> {
        let app = setup_test_app().await?;
        let created = started(&app, "FT-905").await?;
        let (fid, pid) = (&created.fornecedor_id, &created.pagamento.id);

        let diretora = user(&app, "diretora.financeira").await;
        app.workflow.approve(&diretora, fid, pid, None).await?;

        let workflow = app.workflow.initialize_workflow(fid, pid).await?.unwrap();
        assert_eq!(workflow.current_step, 1);
        assert_eq!(app.notifications.for_user("diretora.financeira").await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_workflow() -> Result<()> {
        let app = setup_test_app().await?;
        let config = WorkflowConfig {
            enabled: false,
            ..WorkflowConfig::default()
        };
        app.workflow.update_workflow_config(&config).await?;
        assert_eq!(app.workflow.workflow_config().await, config);

        let created = create_test_pagamento(&app, "Construções Norte", "FT-906", 10.0).await?;
        let workflow = app
            .workflow
            .initialize_workflow(&created.fornecedor_id, &created.pagamento.id)
            .await?;
        assert!(workflow.is_none());

        let missing = app.workflow.initialize_workflow(&created.fornecedor_id, "nope").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_config_rejects_empty_chain() -> Result<()> {
        let app = setup_test_app().await?;
        let config = WorkflowConfig {
            enabled: true,
            steps: Vec::new(),
        };
        let result = app.workflow.update_workflow_config(&config).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }
}
