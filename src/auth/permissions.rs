use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewRecords,
    WriteRecords,

    DeleteRecords,
    ReviewConsultations,
    ManageSupportPlans,
    ManageDocuments,
    ManageDeposits,
    ManageStaff,

    ManageFacilities,
    AssignRoles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[field(value = "staff")]
    Staff,
    #[field(value = "manager")]
    Manager,
    #[field(value = "admin")]
    Admin,
}

static STAFF_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewRecords);
    permissions.insert(Permission::WriteRecords);

    permissions
});

static MANAGER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(STAFF_PERMISSIONS.iter().copied());

    permissions.insert(Permission::DeleteRecords);
    permissions.insert(Permission::ReviewConsultations);
    permissions.insert(Permission::ManageSupportPlans);
    permissions.insert(Permission::ManageDocuments);
    permissions.insert(Permission::ManageDeposits);
    permissions.insert(Permission::ManageStaff);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(MANAGER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageFacilities);
    permissions.insert(Permission::AssignRoles);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Staff => &STAFF_PERMISSIONS,
            Role::Manager => &MANAGER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "staff" => Ok(Role::Staff),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        for permission in Role::Staff.permissions() {
            assert!(Role::Manager.has_permission(*permission));
        }
        for permission in Role::Manager.permissions() {
            assert!(Role::Admin.has_permission(*permission));
        }
    }

    #[test]
    fn test_staff_cannot_delete_or_review() {
        assert!(Role::Staff.has_permission(Permission::WriteRecords));
        assert!(!Role::Staff.has_permission(Permission::DeleteRecords));
        assert!(!Role::Staff.has_permission(Permission::ReviewConsultations));
        assert!(!Role::Manager.has_permission(Permission::ManageFacilities));
        assert!(!Role::Manager.has_permission(Permission::AssignRoles));
    }

    #[test]
    fn test_role_string_round_trip() {
        for role in [Role::Staff, Role::Manager, Role::Admin] {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        }
        assert!(Role::from_str("coach").is_err());
    }
}
