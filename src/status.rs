//! Closed value sets stored in enum columns, plus the transition table for
//! every moderated entity.
//!
//! Every wire value is the SCREAMING_SNAKE_CASE variant name, both in JSON
//! and in the Postgres enum types declared in `migrations/`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Input that is not a member of the enumerated set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// A transition the table does not allow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot move {kind} from {from} to {to}")]
pub struct InvalidTransition {
    pub kind: &'static str,
    pub from: String,
    pub to: String,
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $pg:literal, $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[sqlx(type_name = $pg, rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const KIND: &'static str = $kind;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownValue { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(PostStatus, "post_status", "post status" {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Deleted => "DELETED",
});

wire_enum!(CommentStatus, "comment_status", "comment status" {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

wire_enum!(ProductStatus, "product_status", "product status" {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
    SoldOut => "SOLD_OUT",
    Deleted => "DELETED",
});

wire_enum!(OrderStatus, "order_status", "order status" {
    PendingPayment => "PENDING_PAYMENT",
    Paid => "PAID",
    Shipped => "SHIPPED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Refunding => "REFUNDING",
    Refunded => "REFUNDED",
});

wire_enum!(PaymentStatus, "payment_status", "payment status" {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

wire_enum!(RefundStatus, "refund_status", "refund status" {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Completed => "COMPLETED",
});

wire_enum!(ComplaintStatus, "complaint_status", "complaint status" {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

wire_enum!(ContentType, "content_type", "content type" {
    Text => "TEXT",
    Html => "HTML",
    Markdown => "MARKDOWN",
});

wire_enum!(RefundKind, "refund_kind", "refund type" {
    Refund => "REFUND",
    Exchange => "EXCHANGE",
});

wire_enum!(ComplaintKind, "complaint_kind", "complaint type" {
    Complaint => "COMPLAINT",
    Suggestion => "SUGGESTION",
});

wire_enum!(FavoriteKind, "favorite_kind", "favorite type" {
    Post => "POST",
    Product => "PRODUCT",
});

wire_enum!(LogLevel, "log_level", "log level" {
    Info => "INFO",
    Warn => "WARN",
    Error => "ERROR",
});

/// Transition table for a status set. Staying in the same state is always
/// allowed so that note-only updates go through.
pub trait StatusMachine: Copy + Eq + fmt::Display {
    const ENTITY: &'static str;

    fn allows(self, next: Self) -> bool;

    fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self == next || self.allows(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                kind: Self::ENTITY,
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

// Moderated content: any member may follow any other.
impl StatusMachine for PostStatus {
    const ENTITY: &'static str = "post";
    fn allows(self, _next: Self) -> bool {
        true
    }
}

impl StatusMachine for CommentStatus {
    const ENTITY: &'static str = "comment";
    fn allows(self, _next: Self) -> bool {
        true
    }
}

impl StatusMachine for ProductStatus {
    const ENTITY: &'static str = "product";
    fn allows(self, _next: Self) -> bool {
        true
    }
}

impl StatusMachine for ComplaintStatus {
    const ENTITY: &'static str = "complaint";
    fn allows(self, _next: Self) -> bool {
        true
    }
}

impl StatusMachine for RefundStatus {
    const ENTITY: &'static str = "refund";
    fn allows(self, next: Self) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Completed) | (Rejected, Completed)
        )
    }
}

impl StatusMachine for PaymentStatus {
    const ENTITY: &'static str = "payment";
    fn allows(self, next: Self) -> bool {
        matches!(self, PaymentStatus::Pending) && next != PaymentStatus::Pending
    }
}

impl StatusMachine for OrderStatus {
    const ENTITY: &'static str = "order";
    fn allows(self, next: Self) -> bool {
        use OrderStatus::*;
        match self {
            PendingPayment => matches!(next, Paid | Cancelled),
            Paid => matches!(next, Shipped | Cancelled | Refunding | Refunded),
            Shipped => matches!(next, Completed | Refunding | Refunded),
            Completed => matches!(next, Refunding | Refunded),
            Refunding => matches!(next, Refunded | Completed | Shipped),
            Cancelled | Refunded => false,
        }
    }
}

/// Admin action on a comment: either a new status or removal of the comment
/// together with its whole reply tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    Set(CommentStatus),
    Delete,
}

impl FromStr for CommentAction {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "DELETED" {
            return Ok(CommentAction::Delete);
        }
        s.parse().map(CommentAction::Set)
    }
}

/// Refunds may only be requested once the goods are on their way.
pub fn order_refundable(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Shipped | OrderStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_members_of_the_set() {
        assert_eq!("APPROVED".parse::<PostStatus>().unwrap(), PostStatus::Approved);
        assert_eq!("SOLD_OUT".parse::<ProductStatus>().unwrap(), ProductStatus::SoldOut);
        let err = "PUBLISHED".parse::<PostStatus>().unwrap_err();
        assert_eq!(err.value, "PUBLISHED");
        assert!("approved".parse::<PostStatus>().is_err());
    }

    #[test]
    fn wire_names_match_serde() {
        for s in OrderStatus::ALL {
            let json = serde_json::to_string(s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
    }

    #[test]
    fn post_status_is_unrestricted() {
        for from in PostStatus::ALL {
            for to in PostStatus::ALL {
                assert!(from.transition(*to).is_ok());
            }
        }
    }

    #[test]
    fn refund_graph() {
        use RefundStatus::*;
        assert!(Pending.transition(Approved).is_ok());
        assert!(Pending.transition(Rejected).is_ok());
        assert!(Approved.transition(Completed).is_ok());
        assert!(Approved.transition(Approved).is_ok());
        assert!(Pending.transition(Completed).is_err());
        assert!(Completed.transition(Pending).is_err());
        assert!(Approved.transition(Pending).is_err());
    }

    #[test]
    fn order_graph() {
        use OrderStatus::*;
        assert!(PendingPayment.transition(Paid).is_ok());
        assert!(Paid.transition(Shipped).is_ok());
        assert!(Shipped.transition(Completed).is_ok());
        assert!(PendingPayment.transition(Shipped).is_err());
        assert!(Cancelled.transition(Paid).is_err());
    }

    #[test]
    fn comment_action_accepts_deleted() {
        assert_eq!("DELETED".parse::<CommentAction>().unwrap(), CommentAction::Delete);
        assert_eq!(
            "REJECTED".parse::<CommentAction>().unwrap(),
            CommentAction::Set(CommentStatus::Rejected)
        );
        assert!("GONE".parse::<CommentAction>().is_err());
    }
}
