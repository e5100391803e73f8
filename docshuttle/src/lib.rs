pub mod config;
pub mod hasher;
pub mod logging;
pub mod report;
pub mod store;
pub mod token;
pub mod transfer;
