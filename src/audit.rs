use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::audit_logs;
use crate::error::AppResult;

/// Record who did what. Callers treat failures as non-fatal: an audit row
/// must never roll back the action it describes.
pub async fn log_audit(
    conn: &DatabaseConnection,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    let entry = audit_logs::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        action: Set(action.to_string()),
        resource: Set(resource.map(str::to_string)),
        metadata: Set(metadata),
        created_at: Set(Utc::now().into()),
    };
    entry.insert(conn).await?;

    Ok(())
}
