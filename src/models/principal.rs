use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AccountStatus, Role};

/// An authenticated actor. Every engine operation receives the acting
/// principal explicitly; nothing reads an ambient current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// New account in `pending` status, awaiting admin approval.
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            status: AccountStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == AccountStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_starts_pending() {
        let p = Principal::new("Ada Osei", "ada@example.com", Role::Patient);
        assert_eq!(p.status, AccountStatus::Pending);
        assert_eq!(p.role, Role::Patient);
        assert!(!p.is_approved());
    }
}
