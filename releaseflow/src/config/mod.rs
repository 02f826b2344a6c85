//! Release configuration and run options.

mod options;
mod release;

pub use options::RunOptions;
pub use release::{ComponentConfig, FlowConfig, ProductConfig, ReleaseConfig, CONFIG_FILE_NAME};
