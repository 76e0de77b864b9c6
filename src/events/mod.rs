//! Runtime events: the broadcast [`Bus`] and the domain [`Event`] model.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
