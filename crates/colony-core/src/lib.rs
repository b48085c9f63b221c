pub mod classifier;
pub mod dispatcher;
pub mod registry;
pub mod retry;
pub mod sanitize;
pub mod status;
pub mod telemetry;

pub use classifier::*;
pub use dispatcher::*;
pub use registry::*;
pub use retry::*;
pub use sanitize::*;
pub use status::*;
pub use telemetry::*;
