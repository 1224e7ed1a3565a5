//! `GET /api/calendar`: fetch the upstream feed, normalize it, and answer with
//! either the event list or a classified error.

pub mod proxy;
pub mod result;
pub mod routes;

pub use proxy::CalendarProxy;
pub use result::{status_for, ErrorBody, ProxyResult};
pub use routes::{routes, serve};
