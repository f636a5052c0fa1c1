//! Time bucketing and aggregation of records into result tables.
//!
//! [`bucket`] maps timestamps to keys, [`reduction`] reduces the values of
//! one field within a bucket, [`aggregate`] ties both together and returns a
//! [`table::ResultTable`].

pub mod aggregate;
pub mod bucket;
pub mod reduction;
pub mod table;
pub mod utility;
