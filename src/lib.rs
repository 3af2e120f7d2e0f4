pub mod clienv;
pub mod error;
pub mod http;
pub mod node;
pub mod settings;
pub mod system;

pub use error::{NodeError, Phase, Result};
pub use node::{DebugInfo, HostFamily, Node, PlatformDriver};
