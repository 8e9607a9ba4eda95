pub mod address;
pub mod checkpoint;
