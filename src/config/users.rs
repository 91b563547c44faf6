//! Default user accounts.
//!
//! Seeded into the `users` key the first time the store is opened with no
//! users. The approver usernames match the default approval chain.

use crate::models::{Role, User};

#[must_use]
pub fn default_users() -> Vec<User> {
    vec![
        seeded("1", "admin", "Administrador", "admin@example.com", Role::Admin),
        seeded(
            "2",
            "diretora.financeira",
            "Diretora Financeira",
            "diretora@example.com",
            Role::FinancialDirector,
        ),
        seeded("3", "reitor", "Reitor", "reitor@example.com", Role::Rector),
    ]
}

fn seeded(id: &str, username: &str, full_name: &str, email: &str, role: Role) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        full_name: full_name.to_string(),
        email: email.to_string(),
        role,
        is_active: true,
        permissions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowConfig;

    #[test]
    fn test_default_users_cover_default_approvers() {
        let users = default_users();
        for step in WorkflowConfig::default().steps {
            assert!(
                users
                    .iter()
                    .any(|u| u.username == step.username && u.role == step.role),
                "no default user for step {}",
                step.username
            );
        }
        assert!(users.iter().any(|u| u.role == Role::Admin));
    }
}
