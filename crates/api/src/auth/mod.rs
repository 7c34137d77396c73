//! Access-token handling. Tokens are issued by the identity service; this
//! server only verifies them.

pub mod jwt;
