mod client;

pub use client::{BASE_URL, MeteocatClient, VARIABLES};
