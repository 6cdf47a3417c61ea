pub mod database;
pub mod migrate;
