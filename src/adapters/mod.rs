pub mod http_refresher;
pub mod redirect;
