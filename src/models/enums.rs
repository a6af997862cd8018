use crate::store::StoreError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
///
/// Serialized form matches `as_str()` so stored documents can be
/// filtered on these fields by their wire value.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(StoreError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Role {
    Patient => "patient",
    Doctor => "doctor",
    Management => "management",
    Admin => "admin",
});

str_enum!(AccountStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Suspended => "suspended",
});

str_enum!(RecordState {
    PendingVerification => "pending_verification",
    Verified => "verified",
    Rejected => "rejected",
});

str_enum!(CaseStatus {
    Improving => "improving",
    Stable => "stable",
    Deteriorating => "deteriorating",
});

str_enum!(CorrectionState {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

str_enum!(CorrectionPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(Resolution {
    Approve => "approve",
    Reject => "reject",
});

str_enum!(NotificationKind {
    NewRecordVerification => "new_record_verification",
    RecordAdded => "record_added",
    RecordVerified => "record_verified",
    RecordRejected => "record_rejected",
    RecordUpdated => "record_updated",
    CorrectionRequested => "correction_requested",
    CorrectionApproved => "correction_approved",
    CorrectionRejected => "correction_rejected",
    ConsentCode => "consent_code",
    AccountApproved => "account_approved",
    AccountRejected => "account_rejected",
    AccountSuspended => "account_suspended",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trip() {
        for (variant, s) in [
            (Role::Patient, "patient"),
            (Role::Doctor, "doctor"),
            (Role::Management, "management"),
            (Role::Admin, "admin"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Role::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn record_state_round_trip() {
        for (variant, s) in [
            (RecordState::PendingVerification, "pending_verification"),
            (RecordState::Verified, "verified"),
            (RecordState::Rejected, "rejected"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(RecordState::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn correction_state_round_trip() {
        for (variant, s) in [
            (CorrectionState::Pending, "pending"),
            (CorrectionState::Approved, "approved"),
            (CorrectionState::Rejected, "rejected"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(CorrectionState::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn notification_kind_round_trip() {
        for (variant, s) in [
            (NotificationKind::NewRecordVerification, "new_record_verification"),
            (NotificationKind::RecordAdded, "record_added"),
            (NotificationKind::RecordVerified, "record_verified"),
            (NotificationKind::RecordRejected, "record_rejected"),
            (NotificationKind::RecordUpdated, "record_updated"),
            (NotificationKind::CorrectionRequested, "correction_requested"),
            (NotificationKind::CorrectionApproved, "correction_approved"),
            (NotificationKind::CorrectionRejected, "correction_rejected"),
            (NotificationKind::ConsentCode, "consent_code"),
            (NotificationKind::AccountApproved, "account_approved"),
            (NotificationKind::AccountRejected, "account_rejected"),
            (NotificationKind::AccountSuspended, "account_suspended"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(NotificationKind::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn unknown_value_is_rejected() {
        let err = RecordState::from_str("archived").unwrap_err();
        match err {
            StoreError::InvalidEnum { field, value } => {
                assert_eq!(field, "RecordState");
                assert_eq!(value, "archived");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serde_form_matches_as_str() {
        let json = serde_json::to_value(RecordState::PendingVerification).unwrap();
        assert_eq!(json, serde_json::json!("pending_verification"));
        let kind: NotificationKind = serde_json::from_str("\"record_verified\"").unwrap();
        assert_eq!(kind, NotificationKind::RecordVerified);
    }
}
