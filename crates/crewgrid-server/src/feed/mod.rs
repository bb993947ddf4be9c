mod hub;
mod websocket;

pub use hub::ChangeHub;
pub use websocket::{router, FeedFrame};
