pub mod client;
pub mod types;

pub use client::{HttpNetwork, Network};
pub use types::{Request, RequestMode, Response, ResponseType};
