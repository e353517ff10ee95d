//! Access control: token codec, secret hashing, sessions, the request-rate
//! governor and the authorization guard.

pub mod guard;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod token;

pub use guard::{authorize, authorize_request, bearer_token, AuthContext, AuthVerdict};
pub use password::SecretHasher;
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use service::{AuthService, IssuedSession, RenewedAccess, SessionPolicy};
pub use token::{token_digest, Claims, TokenCodec, TokenError, TokenKind, VerifiedToken};
