pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod output;
pub mod parser;
pub mod record;
pub mod services;
pub mod takeout;
pub mod weather;

pub use analyzers::aggregate::{aggregate, aggregate_batch};
pub use analyzers::bucket::{BucketKey, TimeUnit};
pub use analyzers::reduction::Reduction;
pub use analyzers::table::ResultTable;
pub use error::{FitError, Result};
pub use record::{Record, RecordBatch, Value};
