use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub facility_ids: Vec<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone, Debug)]
pub struct DbUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl DbUser {
    pub fn into_user(self, facility_ids: Vec<i64>) -> Result<User, AppError> {
        let role = Role::from_str(&self.role)
            .map_err(|e| AppError::Internal(format!("User {} has invalid role: {}", self.id, e)))?;

        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            is_active: self.is_active,
            facility_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Which facilities a user may read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityScope {
    All,
    Only(Vec<i64>),
}

impl FacilityScope {
    pub fn allows(&self, facility_id: i64) -> bool {
        match self {
            FacilityScope::All => true,
            FacilityScope::Only(ids) => ids.contains(&facility_id),
        }
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::forbidden())
        }
    }

    pub fn facility_scope(&self) -> FacilityScope {
        match self.role {
            Role::Admin => FacilityScope::All,
            _ => FacilityScope::Only(self.facility_ids.clone()),
        }
    }

    pub fn ensure_facility(&self, facility_id: i64) -> Result<(), AppError> {
        if self.facility_scope().allows(facility_id) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                facility_id = %facility_id,
                "Facility access denied"
            );
            Err(AppError::Authorization(
                "この施設のデータにアクセスする権限がありません。".to_string(),
            ))
        }
    }

    /// For rows reached through several facilities: passes when any of them
    /// is in scope. Rows linked to no facility are visible to admins only.
    pub fn ensure_any_facility(&self, facility_ids: &[i64]) -> Result<(), AppError> {
        let scope = self.facility_scope();
        if matches!(scope, FacilityScope::All) || facility_ids.iter().any(|id| scope.allows(*id)) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                facility_ids = ?facility_ids,
                "Facility access denied"
            );
            Err(AppError::Authorization(
                "この施設のデータにアクセスする権限がありません。".to_string(),
            ))
        }
    }
}
