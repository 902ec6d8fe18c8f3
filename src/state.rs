use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::gateway::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub gateway: PaymentGateway,
    pub config: AppConfig,
}
