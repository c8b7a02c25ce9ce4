pub mod chart;
pub mod database;
pub mod nl_query;

pub use chart::*;
pub use database::*;
pub use nl_query::*;
