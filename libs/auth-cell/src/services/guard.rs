use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::Database;
use shared_models::auth::{AuthenticatedPrincipal, RoleRequirement, User};
use shared_models::error::AppError;

use crate::services::directory::find_user;

/// Resolves the caller of a request to an [`AuthenticatedPrincipal`].
///
/// The role always comes from the `users` directory at the time of the call,
/// never from the token claims, so a demotion takes effect on the next request.
pub struct AuthorizationGuard {
    db: Arc<Database>,
}

impl AuthorizationGuard {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn require_role(
        &self,
        user: &User,
        requirement: RoleRequirement,
    ) -> Result<AuthenticatedPrincipal, AppError> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Invalid subject in token".to_string()))?;

        let stored = self
            .db
            .read(move |conn| find_user(conn, user_id))
            .await?
            .ok_or_else(|| {
                debug!("No directory entry for user {}", user_id);
                AppError::NotFound("User not found".to_string())
            })?;

        if !requirement.permits(stored.role) {
            warn!(
                "User {} with role {} denied {:?} access",
                user_id, stored.role, requirement
            );
            return Err(AppError::Forbidden("Insufficient permissions".to_string()));
        }

        Ok(stored.to_principal())
    }
}
