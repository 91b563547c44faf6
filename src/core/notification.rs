//! Notifications - the sink the workflow engine reports to, and the inbox
//! operations over the `notifications` key.

use crate::{
    errors::{Error, Result},
    models::{BROADCAST, Notification},
    storage::{Repository, Store},
};
use async_trait::async_trait;
use tracing::debug;

/// Destination for notifications raised by the core.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers `notification`.
    async fn notify(&self, notification: Notification) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    repo: Repository<Notification>,
}

impl NotificationService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
        }
    }

    pub async fn list(&self) -> Vec<Notification> {
        self.repo.list().await
    }

    /// Stores `notification`.
    ///
    /// # Errors
    /// Returns `Error::Validation` if a notification with the same id exists.
    pub async fn add(&self, notification: Notification) -> Result<Notification> {
        debug!(
            "Notification '{}' for {} ({})",
            notification.title, notification.user_id, notification.kind
        );
        self.repo.add(notification).await
    }

    /// Notifications addressed to `user_id` or broadcast, newest first.
    pub async fn for_user(&self, user_id: &str) -> Vec<Notification> {
        let mut own: Vec<Notification> = self
            .repo
            .load_local()
            .await
            .into_iter()
            .filter(|n| n.user_id == user_id || n.is_broadcast())
            .collect();
        own.sort_by(|a, b| b.date.cmp(&a.date));
        own
    }

    pub async fn unread_count(&self, user_id: &str) -> usize {
        self.for_user(user_id).await.iter().filter(|n| !n.read).count()
    }

    /// # Errors
    /// Returns `Error::NotFound` if the notification does not exist.
    pub async fn mark_as_read(&self, id: &str) -> Result<Notification> {
        self.repo
            .mutate_debounced(|items| {
                let notification = items
                    .iter_mut()
                    .find(|n| n.id == id)
                    .ok_or_else(|| Error::not_found("Notification", id))?;
                notification.read = true;
                Ok(notification.clone())
            })
            .await
    }

    /// Marks everything visible to `user_id` as read. Returns how many changed.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn mark_all_as_read(&self, user_id: &str) -> Result<usize> {
        self.repo
            .mutate_debounced(|items| {
                let mut changed = 0;
                for n in items
                    .iter_mut()
                    .filter(|n| !n.read && (n.user_id == user_id || n.user_id == BROADCAST))
                {
                    n.read = true;
                    changed += 1;
                }
                Ok(changed)
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the notification does not exist.
    pub async fn delete(&self, id: &str) -> Result<Notification> {
        self.repo.delete(id).await
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.add(notification).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;

    #[tokio::test]
    async fn test_for_user_includes_broadcasts() -> Result<()> {
        let service = NotificationService::new(setup_test_store().await?);

        service
            .notify(Notification::new("reitor", "Aprovar", "FT-1", "payment_approval", "p1"))
            .await?;
        service
            .notify(Notification::new(BROADCAST, "Aprovado", "FT-2", "payment_approved", "p2"))
            .await?;
        service
            .notify(Notification::new("admin", "Outro", "FT-3", "info", "p3"))
            .await?;

        let inbox = service.for_user("reitor").await;
        assert_eq!(inbox.len(), 2);
        assert_eq!(service.unread_count("reitor").await, 2);

        assert_eq!(service.mark_all_as_read("reitor").await?, 2);
        assert_eq!(service.unread_count("reitor").await, 0);
        // The admin's own notification is untouched
        assert_eq!(service.unread_count("admin").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_as_read_and_delete() -> Result<()> {
        let service = NotificationService::new(setup_test_store().await?);
        let n = service
            .add(Notification::new("admin", "t", "m", "info", ""))
            .await?;

        assert!(service.mark_as_read(&n.id).await?.read);
        service.delete(&n.id).await?;
        assert!(service.list().await.is_empty());
        assert!(matches!(
            service.mark_as_read(&n.id).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }
}
