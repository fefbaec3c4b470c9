use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::Database;
use shared_models::auth::{AuthenticatedPrincipal, Role};

use crate::services::guard::AuthorizationGuard;

/// A row of the `users` directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirectoryUser {
    pub fn to_principal(&self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: self.id,
            role: self.role,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

pub struct AuthCellState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub guard: Arc<AuthorizationGuard>,
}

impl AuthCellState {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        let guard = Arc::new(AuthorizationGuard::new(Arc::clone(&db)));
        Self { config, db, guard }
    }
}
