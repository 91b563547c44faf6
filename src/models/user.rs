use crate::storage::{Record, keys};
use serde::{Deserialize, Serialize};

/// Permission names checked by [`crate::core::user::UserService::has_permission`].
pub mod permissions {
    pub const VIEW_PAYMENTS: &str = "view_payments";
    pub const MANAGE_PAYMENTS: &str = "manage_payments";
    pub const APPROVE_PAYMENTS: &str = "approve_payments";
    pub const MANAGE_CHEQUES: &str = "manage_cheques";
    pub const MANAGE_PETTY_CASH: &str = "manage_petty_cash";
    pub const MANAGE_REVENUES: &str = "manage_revenues";
    pub const VIEW_REPORTS: &str = "view_reports";
    pub const MANAGE_USERS: &str = "manage_users";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    FinancialDirector,
    #[serde(alias = "reitor")]
    Rector,
    User,
}

impl Role {
    /// Permissions every user with this role holds.
    #[must_use]
    pub const fn default_permissions(self) -> &'static [&'static str] {
        use permissions::{
            APPROVE_PAYMENTS, MANAGE_CHEQUES, MANAGE_PAYMENTS, MANAGE_PETTY_CASH, MANAGE_REVENUES,
            MANAGE_USERS, VIEW_PAYMENTS, VIEW_REPORTS,
        };
        match self {
            Self::Admin => &[
                VIEW_PAYMENTS,
                MANAGE_PAYMENTS,
                APPROVE_PAYMENTS,
                MANAGE_CHEQUES,
                MANAGE_PETTY_CASH,
                MANAGE_REVENUES,
                VIEW_REPORTS,
                MANAGE_USERS,
            ],
            Self::FinancialDirector => &[
                VIEW_PAYMENTS,
                MANAGE_PAYMENTS,
                APPROVE_PAYMENTS,
                MANAGE_CHEQUES,
                MANAGE_PETTY_CASH,
                VIEW_REPORTS,
            ],
            Self::Rector => &[VIEW_PAYMENTS, APPROVE_PAYMENTS, VIEW_REPORTS],
            Self::User => &[VIEW_PAYMENTS],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Permissions granted on top of the role defaults.
    #[serde(default)]
    pub permissions: Vec<String>,
}

const fn default_active() -> bool {
    true
}

impl User {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        let username = username.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: username.clone(),
            username,
            email: String::new(),
            role,
            is_active: true,
            permissions: Vec::new(),
        }
    }
}

impl Record for User {
    const STORAGE_KEY: &'static str = keys::USERS;
    const ENTITY: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }
}
