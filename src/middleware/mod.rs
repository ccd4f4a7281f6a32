pub mod auth;

pub use auth::{AuthSettings, AuthenticatedUser, Claims, ADMIN_ROLE, USER_ROLE};
