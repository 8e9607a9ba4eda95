pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod scan;
pub mod store;
