pub mod client;
pub mod request;
mod session;

pub use client::ApiClient;
pub use request::{ApiRequest, ApiResponse};
