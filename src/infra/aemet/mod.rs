mod client;

pub use client::{AemetClient, BASE_URL, VARIABLES};
