pub mod config;
pub mod file_store;
pub mod graph_store;
pub mod lock;
pub mod store;

pub use config::*;
pub use file_store::*;
pub use graph_store::*;
pub use lock::*;
pub use store::*;
