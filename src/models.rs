use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle states. `Confirmed`, `Cancelled` and `Expired` are
/// terminal: nothing transitions out of them, ever.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "payment_initiated")]
    PaymentInitiated,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "gateway")]
    Gateway,
    #[sea_orm(string_value = "cod")]
    Cod,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Gateway
    }
}

/// Actions a client may legally attempt next, derived from the current
/// status so the storefront never has to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    InitiatePayment,
    VerifyPayment,
    Retry,
    Cancel,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentInitiated => "payment_initiated",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }

    /// The full transition table. Every status change in the system goes
    /// through a compare-and-set guarded by this relation.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, PaymentInitiated) => true,
            // Cash-on-delivery confirms at placement, without a gateway leg.
            (Pending, Confirmed) => true,
            (Pending, Cancelled) | (Pending, Expired) => true,

            (PaymentInitiated, Confirmed) | (PaymentInitiated, Failed) => true,
            (PaymentInitiated, Cancelled) | (PaymentInitiated, Expired) => true,
            // Retry refreshes the gateway session while already initiated.
            (PaymentInitiated, PaymentInitiated) => true,

            (Failed, PaymentInitiated) => true,
            (Failed, Cancelled) => true,

            _ => false,
        }
    }

    pub fn next_actions(&self) -> &'static [OrderAction] {
        match self {
            OrderStatus::Pending => &[OrderAction::InitiatePayment, OrderAction::Cancel],
            OrderStatus::PaymentInitiated => &[
                OrderAction::VerifyPayment,
                OrderAction::Retry,
                OrderAction::Cancel,
            ],
            OrderStatus::Failed => &[OrderAction::Retry, OrderAction::Cancel],
            OrderStatus::Confirmed | OrderStatus::Cancelled | OrderStatus::Expired => &[],
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "payment_initiated" => Ok(OrderStatus::PaymentInitiated),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(format!("unknown order status `{other}`")),
        }
    }
}

/// Postal address captured at checkout, stored as a JSON column on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub total: Decimal,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        use OrderStatus::*;
        let all = [
            Pending,
            PaymentInitiated,
            Confirmed,
            Failed,
            Cancelled,
            Expired,
        ];
        for terminal in [Confirmed, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} must not transition to {next}"
                );
            }
            assert!(terminal.next_actions().is_empty());
        }
    }

    #[test]
    fn pending_order_can_only_start_confirm_cancel_or_expire() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(PaymentInitiated));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn failed_is_recoverable_not_terminal() {
        use OrderStatus::*;
        assert!(!Failed.is_terminal());
        assert!(Failed.can_transition_to(PaymentInitiated));
        assert!(Failed.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Confirmed));
        assert!(!Failed.can_transition_to(Expired));
        assert_eq!(
            Failed.next_actions(),
            &[OrderAction::Retry, OrderAction::Cancel]
        );
    }

    #[test]
    fn initiated_order_can_refresh_its_session() {
        use OrderStatus::*;
        assert!(PaymentInitiated.can_transition_to(PaymentInitiated));
        assert!(PaymentInitiated.can_transition_to(Confirmed));
        assert!(PaymentInitiated.can_transition_to(Failed));
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PaymentInitiated).unwrap();
        assert_eq!(json, "\"payment_initiated\"");
        let back: OrderStatus = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(back, OrderStatus::Expired);
        let method = serde_json::to_string(&PaymentMethod::Cod).unwrap();
        assert_eq!(method, "\"cod\"");
    }

    #[test]
    fn status_parses_from_query_strings() {
        assert_eq!(
            "payment_initiated".parse::<OrderStatus>().unwrap(),
            OrderStatus::PaymentInitiated
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}
