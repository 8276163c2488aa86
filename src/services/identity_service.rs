use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(Error::NotAuthorized("admin or moderator role required".to_string()))
        }
    }

    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!("{:?} role required", role).to_lowercase()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub is_active: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Identity>>;
}

#[derive(Clone)]
pub struct PgIdentityProvider {
    pool: PgPool,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Identity>> {
        let row = sqlx::query(r#"SELECT id, role, is_active FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Identity {
            user_id: row.try_get("id")?,
            role: row.try_get("role")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

pub fn authorize(identity: Option<Identity>) -> Result<Caller> {
    match identity {
        Some(identity) if identity.is_active => Ok(Caller {
            user_id: identity.user_id,
            role: identity.role,
        }),
        Some(_) => Err(Error::NotAuthorized("account is deactivated".to_string())),
        None => Err(Error::Unauthorized("unknown account".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_accounts_are_refused() {
        let id = Uuid::new_v4();
        let active = authorize(Some(Identity { user_id: id, role: Role::Client, is_active: true })).unwrap();
        assert_eq!(active.user_id, id);
        assert!(matches!(
            authorize(Some(Identity { user_id: id, role: Role::Admin, is_active: false })),
            Err(Error::NotAuthorized(_))
        ));
        assert!(matches!(authorize(None), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn staff_roles() {
        let caller = |role| Caller { user_id: Uuid::nil(), role };
        assert!(caller(Role::Admin).require_staff().is_ok());
        assert!(caller(Role::Moderator).require_staff().is_ok());
        assert!(caller(Role::Client).require_staff().is_err());
        assert!(caller(Role::Freelancer).require_role(Role::Freelancer).is_ok());
        assert!(caller(Role::Client).require_role(Role::Freelancer).is_err());
    }
}
