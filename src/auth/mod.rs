//! Authentication module
//!
//! Registration, login, token issuance and refresh, and the brute-force
//! login throttle that wraps the login path.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod service;
pub mod throttle;
pub mod token;
pub mod validation;

pub use middleware::AuthenticatedUser;
pub use password::PasswordHasher;
pub use service::AuthService;
pub use throttle::{FailureOutcome, LoginThrottle, ThrottleConfig};
pub use token::{Claims, TokenKind, TokenPair, TokenService};
