pub mod csv_store;
pub mod repo;
