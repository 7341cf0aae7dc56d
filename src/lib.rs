pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod storage;
