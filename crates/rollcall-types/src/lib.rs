//! Shared types for the Rollcall attendance logger.

mod event;
mod keywords;
mod scan;
mod ws;

pub use event::*;
pub use keywords::*;
pub use scan::*;
pub use ws::*;
