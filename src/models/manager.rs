use serde::Deserialize;
use validator::Validate;

use crate::auth::Role;
use crate::db::users::{NewUser, UserChanges};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StaffCreateInput {
    #[validate(length(min = 1, max = 100, message = "氏名は1〜100文字で入力してください。"))]
    pub name: String,
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "パスワードは8〜128文字で入力してください。"))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub facility_ids: Vec<i64>,
}

fn default_role() -> Role {
    Role::Staff
}

impl StaffCreateInput {
    pub fn new_user(&self) -> NewUser {
        NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            role: self.role,
        }
    }
}

/// Partial update of a staff account; `facility_ids`, when present, replaces
/// all assignments.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StaffUpdateInput {
    #[validate(length(min = 1, max = 100, message = "氏名は1〜100文字で入力してください。"))]
    pub name: Option<String>,
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128, message = "パスワードは8〜128文字で入力してください。"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub facility_ids: Option<Vec<i64>>,
}

impl StaffUpdateInput {
    pub fn changes(&self) -> UserChanges {
        UserChanges {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            role: self.role,
            is_active: self.is_active,
        }
    }
}
