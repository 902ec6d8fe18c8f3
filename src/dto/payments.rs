use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::gateway::GatewaySession;
use crate::models::{Order, OrderAction};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInitiation {
    pub order: Order,
    pub next_actions: Vec<OrderAction>,
    /// Absent for cash-on-delivery orders, which confirm without a gateway leg.
    pub session: Option<GatewaySession>,
}

/// The signed triple handed back by the gateway after the user pays.
/// Validated atomically; unknown fields a tampering client might add
/// (an `amount`, say) are dropped at deserialization.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CompletePaymentRequest {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResult {
    pub order: Order,
    pub verified: bool,
    pub next_actions: Vec<OrderAction>,
}
