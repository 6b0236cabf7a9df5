//! Asynchronous delivery of engine results to a front end.

pub mod events;
pub mod proxy;
pub mod tasks;

pub use events::TaskEvent;
pub use proxy::EventProxy;
