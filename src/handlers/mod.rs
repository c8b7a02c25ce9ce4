pub mod databases;
pub mod health;
pub mod query;
pub mod visualisation;
