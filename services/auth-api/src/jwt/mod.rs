//! Bearer token issuance for calls to the users API.

mod claims;
mod issuer;

pub use claims::{READ_SCOPE, UserApiClaims};
pub use issuer::{HmacTokenIssuer, TokenIssuer};
