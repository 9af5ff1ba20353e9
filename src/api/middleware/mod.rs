//! Request middleware, applied in this order: authentication, rate limit,
//! key-type guard

pub mod auth;
pub mod guards;
pub mod rate_limit;
