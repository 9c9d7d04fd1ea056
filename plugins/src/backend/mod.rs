pub mod http;
pub mod replay;

pub use http::HttpRunBackend;
pub use replay::ReplayRunBackend;
