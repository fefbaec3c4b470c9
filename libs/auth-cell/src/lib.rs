pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::AuthCellState;
pub use services::guard::AuthorizationGuard;
