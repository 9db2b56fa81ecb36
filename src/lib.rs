pub mod config;
pub mod humanize;
pub mod ledger;
pub mod messaging;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod status;
pub mod storage;
pub mod worker;
