pub mod access_log;
pub mod pin_store;
pub mod user_store;

pub use access_log::{AccessLogRecord, JsonlAccessLog};
pub use pin_store::PinStore;
pub use user_store::UserStore;
