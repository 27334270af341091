pub mod config;
pub mod dataset;
pub mod error;
pub mod load;
pub mod pipeline;
pub mod schema;
pub mod sources;
pub mod store;
pub mod telemetry;
pub mod tsv;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::{ImportConfig, Intents};
pub use load::{LoadDriver, LoadReport};
pub use pipeline::RunSummary;
