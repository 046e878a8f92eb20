pub mod request_event;

pub use request_event::{Monitor, RequestEvent};
