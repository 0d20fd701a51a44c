//! Permission catalog synchronization.
//!
//! An application declares its full permission set; each declaration is
//! upserted on `(application_id, code)`. Records are written in fixed-size
//! batches, each batch in its own transaction. Batches are not atomic with
//! respect to each other: when one fails, earlier batches stay committed and
//! the failure reports how far the sync got.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::deadline::Deadline;
use super::error::ServiceError;
use super::metrics::{self, BATCH_COMMITTED, BATCH_FAILED};
use super::store::AuthorizationStore;
use crate::models::Permission;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDeclaration {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub application_code: String,
    pub permissions: Vec<PermissionDeclaration>,
    /// Caller-supplied catalog version, stamped on every record.
    pub version: i32,
    pub requested_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    #[schema(example = "BILLING")]
    pub application_code: String,
    pub version: i32,
    /// Distinct permission codes written.
    pub upserted: usize,
    pub batches: usize,
}

#[derive(Clone)]
pub struct PermissionSynchronizer {
    store: Arc<dyn AuthorizationStore>,
    batch_size: usize,
}

impl PermissionSynchronizer {
    pub fn new(store: Arc<dyn AuthorizationStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn sync(
        &self,
        request: SyncRequest,
        deadline: Deadline,
    ) -> Result<SyncReport, ServiceError> {
        let application_code = request.application_code.trim();
        if application_code.is_empty() {
            return Err(ServiceError::InvalidInput(
                "application code is required".to_string(),
            ));
        }
        if request.version < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "version must be at least 1, got {}",
                request.version
            )));
        }
        let declarations = normalize(request.permissions)?;

        let application = deadline
            .run("permission_sync.resolve_application", async {
                self.store
                    .get_application_by_code(application_code)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("application", application_code))
            })
            .await?;

        let records: Vec<Permission> = declarations
            .into_iter()
            .map(|(code, description)| {
                Permission::new(
                    application.id,
                    code,
                    description,
                    request.version,
                    request.requested_by,
                )
            })
            .collect();

        let batches = records.len().div_ceil(self.batch_size);
        let mut committed = 0;

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let result = deadline
                .run("permission_sync.batch", self.store.upsert_permissions(batch))
                .await;

            match result {
                Ok(()) => {
                    committed += batch.len();
                    metrics::record_sync_batch(BATCH_COMMITTED);
                    tracing::debug!(
                        application = %application.code,
                        batch = index + 1,
                        batches,
                        records = batch.len(),
                        "Permission batch committed"
                    );
                }
                Err(source) => {
                    metrics::record_sync_batch(BATCH_FAILED);
                    tracing::error!(
                        application = %application.code,
                        batch = index + 1,
                        batches,
                        committed,
                        error = %source,
                        "Permission batch failed"
                    );
                    return Err(ServiceError::SyncBatchFailed {
                        batch: index + 1,
                        batches,
                        committed,
                        source: Box::new(source),
                    });
                }
            }
        }

        tracing::info!(
            application = %application.code,
            version = request.version,
            upserted = committed,
            batches,
            "Permission catalog synchronized"
        );

        Ok(SyncReport {
            application_code: application.code,
            version: request.version,
            upserted: committed,
            batches,
        })
    }
}

/// Trim codes, reject blanks, and collapse duplicates (the last declaration
/// of a code wins). Output is ordered by code.
fn normalize(
    declarations: Vec<PermissionDeclaration>,
) -> Result<BTreeMap<String, String>, ServiceError> {
    let mut by_code = BTreeMap::new();
    for (index, declaration) in declarations.into_iter().enumerate() {
        let code = declaration.code.trim();
        if code.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "permission #{} has an empty code",
                index + 1
            )));
        }
        by_code.insert(code.to_string(), declaration.description);
    }
    Ok(by_code)
}
