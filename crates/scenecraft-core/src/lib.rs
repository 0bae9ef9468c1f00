pub mod colorspace;
pub mod config;
pub mod error;
pub mod project;
pub mod transitions;

pub use config::{ConfigLoader, DurationProbe, NullProbe};
pub use error::{EngineError, Result};
pub use project::Project;
