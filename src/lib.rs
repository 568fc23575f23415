pub mod config;
pub mod derive;
pub mod duck;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod schema;
pub mod source;

pub use config::Config;
pub use error::IngestError;
pub use pipeline::{run, RunSummary};
