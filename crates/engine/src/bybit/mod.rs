pub mod rest;
pub mod stream;

pub use rest::BybitClient;
pub use stream::BybitFeed;
