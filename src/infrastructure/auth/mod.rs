mod claims;
mod extract;
mod jwt;

pub use claims::{Caller, Claims};
pub use extract::{extract_bearer_token, CallContext};
pub use jwt::JwtValidator;
