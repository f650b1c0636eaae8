pub mod auth;
pub mod errors;
pub mod http;

pub use errors::ApiError;
pub use http::{router, start_http_server};
