//! The range server (spec §4.4): a listener thread, a configurable worker
//! pool, and the handlers that execute requests against the local ordered
//! store.

pub mod handlers;
pub mod listener;
pub mod range_server;
pub mod reply;
pub mod worker;
pub mod workqueue;

pub use handlers::HandlerConfig;
pub use range_server::RangeServer;
pub use reply::ReplyTarget;
