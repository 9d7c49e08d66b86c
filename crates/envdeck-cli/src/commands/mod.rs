pub mod checksum;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod run;
