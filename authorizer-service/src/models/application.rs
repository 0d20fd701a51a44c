use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Free-form application metadata. Stored and returned as-is.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A registered client application. `code` is the stable external identifier
/// carried in token audiences and authorization entries.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Application {
    pub id: Uuid,
    #[schema(example = "BILLING")]
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(json)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(code: String, name: String, description: Option<String>, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            code,
            name,
            description,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
