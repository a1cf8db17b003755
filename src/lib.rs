pub mod app;
pub mod batch;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod output;
pub mod query;
pub mod retry;
pub mod store;
pub mod taxa;
pub mod uniprot;
