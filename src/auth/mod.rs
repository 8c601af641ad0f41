//! Authentication core: password hashing, token issuance and the session
//! lifecycle service.

pub mod error;
pub mod password;
pub mod service;
pub mod tokens;

pub use error::AuthError;
pub use service::{AuthService, AuthSettings, SessionTokens};
pub use tokens::{Claims, TokenIssuer};
