//! Account status workflow.
//!
//! Registration is open for every role except admin; new accounts sit
//! in `pending` until an admin approves, rejects or (later) suspends
//! them. Status changes notify the subject through the outbox like
//! every other side effect.

use uuid::Uuid;

use crate::models::{AccountStatus, NotificationKind, OutboxEntry, Principal, Role};
use crate::store::{collections, encode, Filter, StoreError};

use super::error::EngineError;
use super::{policy, Engine};

impl Engine {
    /// Self-registration. The account starts `pending`; admin accounts
    /// cannot be self-registered.
    pub fn register(&self, name: &str, email: &str, role: Role) -> Result<Principal, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("Name is required".into()));
        }
        let email = email.trim().to_lowercase();
        if email.len() < 3 || !email.contains('@') {
            return Err(EngineError::Validation(
                "A valid email address is required".into(),
            ));
        }
        if role == Role::Admin {
            return Err(EngineError::Validation(
                "Admin accounts cannot be self-registered".into(),
            ));
        }

        let principal = Principal::new(name.trim(), email, role);
        self.store
            .insert(collections::USERS, principal.id, encode(&principal)?)
            .map_err(|e| match e {
                StoreError::UniqueViolation { .. } => {
                    EngineError::Conflict("This email address is already registered".into())
                }
                other => other.into(),
            })?;

        tracing::info!(
            principal_id = %principal.id,
            role = principal.role.as_str(),
            "Account registered"
        );
        Ok(principal)
    }

    /// Admin decision on an account: approve, reject or suspend. The
    /// subject is notified; moving an account back to `pending` is not
    /// a thing.
    pub fn set_account_status(
        &self,
        admin: &Principal,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Principal, EngineError> {
        policy::require_role(admin, Role::Admin, "manage accounts")?;
        if account_id == admin.id {
            return Err(EngineError::Validation(
                "Administrators cannot change their own status".into(),
            ));
        }
        let (kind, title, message) = match status {
            AccountStatus::Approved => (
                NotificationKind::AccountApproved,
                "Account approved",
                "Your account was approved. You can now sign in.",
            ),
            AccountStatus::Rejected => (
                NotificationKind::AccountRejected,
                "Account rejected",
                "Your registration was rejected.",
            ),
            AccountStatus::Suspended => (
                NotificationKind::AccountSuspended,
                "Account suspended",
                "Your account was suspended. Contact an administrator.",
            ),
            AccountStatus::Pending => {
                return Err(EngineError::Validation(
                    "Accounts cannot be moved back to pending".into(),
                ));
            }
        };

        let doc = self
            .store
            .get(collections::USERS, account_id)?
            .ok_or_else(|| EngineError::NotFound(format!("Account {account_id} not found")))?;
        let mut account: Principal = doc.parse()?;
        if account.status == status {
            return Err(EngineError::InvalidState(format!(
                "Account is already {}",
                status.as_str()
            )));
        }

        account.status = status;
        self.store.update(
            collections::USERS,
            account.id,
            encode(&account)?,
            Some(doc.version),
        )?;

        self.enqueue(OutboxEntry::new(account.id, kind, title, message))?;

        tracing::info!(
            account_id = %account.id,
            status = account.status.as_str(),
            "Account status changed"
        );
        Ok(account)
    }

    /// Admin listing, optionally narrowed to one status. Oldest first,
    /// so the approval queue reads top-down.
    pub fn list_accounts(
        &self,
        admin: &Principal,
        status: Option<AccountStatus>,
    ) -> Result<Vec<Principal>, EngineError> {
        policy::require_role(admin, Role::Admin, "list accounts")?;
        let mut filter = Filter::new().order_asc("created_at");
        if let Some(status) = status {
            filter = filter.eq("status", status);
        }
        self.store
            .query(collections::USERS, &filter)?
            .iter()
            .map(|doc| doc.parse::<Principal>().map_err(Into::into))
            .collect()
    }

    /// Look an account up by email. Used on the session issue path.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Principal>, EngineError> {
        let docs = self.store.query(
            collections::USERS,
            &Filter::new().eq("email", email.trim().to_lowercase()).limit(1),
        )?;
        match docs.first() {
            Some(doc) => Ok(Some(doc.parse()?)),
            None => Ok(None),
        }
    }

    /// First-start bootstrap: create an approved admin account when no
    /// admin exists yet.
    pub fn ensure_bootstrap_admin(&self, email: &str) -> Result<(), EngineError> {
        let admins = self.store.query(
            collections::USERS,
            &Filter::new().eq("role", Role::Admin).limit(1),
        )?;
        if !admins.is_empty() {
            return Ok(());
        }
        let mut admin = Principal::new("Administrator", email.trim().to_lowercase(), Role::Admin);
        admin.status = AccountStatus::Approved;
        self.store
            .insert(collections::USERS, admin.id, encode(&admin)?)?;
        tracing::info!(email = %admin.email, "Bootstrap admin account created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{engine, outbox_deliveries, seed_principal};
    use super::*;

    #[test]
    fn registration_starts_pending_and_normalizes_email() {
        let (engine, _) = engine();
        let p = engine
            .register("Ama Boateng", "  Ama.Boateng@Example.COM ", Role::Patient)
            .unwrap();
        assert_eq!(p.status, AccountStatus::Pending);
        assert_eq!(p.email, "ama.boateng@example.com");
        assert_eq!(engine.get_principal(p.id).unwrap().email, p.email);
    }

    #[test]
    fn registration_rejects_bad_input() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.register(" ", "a@ex.com", Role::Patient).unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.register("Ama", "not-an-email", Role::Patient).unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.register("Ama", "a@ex.com", Role::Admin).unwrap_err(),
            EngineError::Validation(_)
        ));
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (engine, _) = engine();
        engine.register("Ama", "ama@example.com", Role::Patient).unwrap();
        let err = engine
            .register("Other Ama", "ama@example.com", Role::Doctor)
            .unwrap_err();
        match err {
            EngineError::Conflict(msg) => {
                assert_eq!(msg, "This email address is already registered")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn approval_updates_status_and_notifies() {
        let (engine, store) = engine();
        let admin = seed_principal(&engine, Role::Admin);
        let p = engine.register("Ama", "ama@example.com", Role::Patient).unwrap();

        let p = engine
            .set_account_status(&admin, p.id, AccountStatus::Approved)
            .unwrap();
        assert_eq!(p.status, AccountStatus::Approved);
        assert!(outbox_deliveries(&store).contains(&(p.id, "account_approved".into())));
    }

    #[test]
    fn suspension_notifies_the_subject() {
        let (engine, store) = engine();
        let admin = seed_principal(&engine, Role::Admin);
        let doctor = seed_principal(&engine, Role::Doctor);

        engine
            .set_account_status(&admin, doctor.id, AccountStatus::Suspended)
            .unwrap();
        assert!(outbox_deliveries(&store).contains(&(doctor.id, "account_suspended".into())));
    }

    #[test]
    fn status_changes_are_admin_only() {
        let (engine, _) = engine();
        let management = seed_principal(&engine, Role::Management);
        let p = engine.register("Ama", "ama@example.com", Role::Patient).unwrap();
        let err = engine
            .set_account_status(&management, p.id, AccountStatus::Approved)
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
    }

    #[test]
    fn status_change_guards() {
        let (engine, _) = engine();
        let admin = seed_principal(&engine, Role::Admin);
        let p = engine.register("Ama", "ama@example.com", Role::Patient).unwrap();

        // Back to pending is not a valid target
        assert!(matches!(
            engine
                .set_account_status(&admin, p.id, AccountStatus::Pending)
                .unwrap_err(),
            EngineError::Validation(_)
        ));
        // Unknown account
        assert!(matches!(
            engine
                .set_account_status(&admin, Uuid::new_v4(), AccountStatus::Approved)
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
        // Self-demotion
        assert!(matches!(
            engine
                .set_account_status(&admin, admin.id, AccountStatus::Suspended)
                .unwrap_err(),
            EngineError::Validation(_)
        ));
        // No-op transition
        engine
            .set_account_status(&admin, p.id, AccountStatus::Approved)
            .unwrap();
        assert!(matches!(
            engine
                .set_account_status(&admin, p.id, AccountStatus::Approved)
                .unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[test]
    fn listing_filters_by_status() {
        let (engine, _) = engine();
        let admin = seed_principal(&engine, Role::Admin);
        let a = engine.register("A", "a@example.com", Role::Patient).unwrap();
        engine.register("B", "b@example.com", Role::Doctor).unwrap();
        engine
            .set_account_status(&admin, a.id, AccountStatus::Approved)
            .unwrap();

        let pending = engine
            .list_accounts(&admin, Some(AccountStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "b@example.com");

        // Unfiltered includes the seeded admin as well
        assert_eq!(engine.list_accounts(&admin, None).unwrap().len(), 3);

        let patient = engine.get_principal(a.id).unwrap();
        assert!(matches!(
            engine.list_accounts(&patient, None).unwrap_err(),
            EngineError::Authorization(_)
        ));
    }

    #[test]
    fn find_by_email_is_case_insensitive() {
        let (engine, _) = engine();
        let p = engine.register("Ama", "ama@example.com", Role::Patient).unwrap();
        let found = engine.find_by_email(" AMA@example.com ").unwrap().unwrap();
        assert_eq!(found.id, p.id);
        assert!(engine.find_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn bootstrap_admin_is_created_once() {
        let (engine, _) = engine();
        engine.ensure_bootstrap_admin("admin@verimed.local").unwrap();
        engine.ensure_bootstrap_admin("admin@verimed.local").unwrap();

        let admin = engine.find_by_email("admin@verimed.local").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.status, AccountStatus::Approved);
        assert_eq!(engine.list_accounts(&admin, None).unwrap().len(), 1);
    }
}
