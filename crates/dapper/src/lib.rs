pub mod config;
pub mod error;
pub mod parsing;
pub mod render;
pub mod site;
pub mod types;
pub mod watch;

pub use config::*;
pub use error::*;
pub use parsing::*;
pub use render::*;
pub use site::*;
pub use types::*;
pub use watch::*;
