use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A permission declared by an application. `(application_id, code)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub application_id: Uuid,
    pub code: String,
    pub description: String,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn new(
        application_id: Uuid,
        code: String,
        description: String,
        version: i32,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            application_id,
            code,
            description,
            version,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
