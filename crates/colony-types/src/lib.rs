pub mod error;
pub mod event;
pub mod manifest;
pub mod state;

pub use error::*;
pub use event::{Event, EventSource};
pub use manifest::*;
pub use state::*;
