//! Users, the current session user and permission checks.

use crate::{
    config::users::default_users,
    errors::{Error, Result},
    models::{Role, User},
    storage::{Repository, Store, keys},
};
use tracing::info;

#[derive(Debug, Clone)]
pub struct UserService {
    repo: Repository<User>,
}

/// Whether `user` holds `permission`, either as an admin, through its role
/// defaults, or by an explicit grant. Inactive users hold nothing.
#[must_use]
pub fn has_permission(user: &User, permission: &str) -> bool {
    if !user.is_active {
        return false;
    }
    user.role == Role::Admin
        || user.role.default_permissions().iter().any(|p| *p == permission)
        || user.permissions.iter().any(|p| p == permission)
}

impl UserService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            repo: Repository::new(store, None),
        }
    }

    pub async fn list(&self) -> Vec<User> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &str) -> Option<User> {
        self.repo.get(id).await
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.repo.find(|u| u.username == username).await
    }

    /// # Errors
    /// Returns `Error::Validation` for an empty or already used username.
    pub async fn add(&self, user: User) -> Result<User> {
        if user.username.trim().is_empty() {
            return Err(Error::validation("Username cannot be empty"));
        }
        self.repo
            .mutate(move |users| {
                if users.iter().any(|u| u.username == user.username) {
                    return Err(Error::validation(format!(
                        "Username '{}' is already in use",
                        user.username
                    )));
                }
                users.push(user.clone());
                Ok(user)
            })
            .await
    }

    /// # Errors
    /// Returns `Error::NotFound` if the user does not exist.
    pub async fn update(&self, user: User) -> Result<User> {
        let updated = self.repo.update(user).await?;
        // Keep the session copy in step with the stored user
        if let Some(current) = self.current_user().await {
            if current.id == updated.id {
                self.set_current_user(Some(&updated)).await;
            }
        }
        Ok(updated)
    }

    /// # Errors
    /// Returns `Error::NotFound` if the user does not exist.
    pub async fn delete(&self, id: &str) -> Result<User> {
        self.repo.delete(id).await
    }

    pub async fn current_user(&self) -> Option<User> {
        self.repo.store().load(keys::CURRENT_USER, None).await
    }

    /// Sets or clears the session user. Setting is debounced; clearing
    /// removes the key at once.
    pub async fn set_current_user(&self, user: Option<&User>) -> bool {
        match user {
            Some(user) => self.repo.store().schedule_save(keys::CURRENT_USER, user).await,
            None => self.repo.store().remove(keys::CURRENT_USER).await,
        }
    }

    /// Username recorded in audit entries for the session.
    pub async fn actor(&self) -> String {
        self.current_user()
            .await
            .map_or_else(|| "sistema".to_string(), |u| u.username)
    }

    pub async fn current_has_permission(&self, permission: &str) -> bool {
        self.current_user()
            .await
            .is_some_and(|u| has_permission(&u, permission))
    }

    /// Writes the default accounts when no users exist. Returns how many were
    /// added.
    ///
    /// # Errors
    /// Propagates repository errors.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let seeded = self
            .repo
            .mutate(|users| {
                if !users.is_empty() {
                    return Ok(0);
                }
                *users = default_users();
                Ok(users.len())
            })
            .await?;
        if seeded > 0 {
            info!("Seeded {} default users", seeded);
        }
        Ok(seeded)
    }
}
