#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod data_loader;
pub mod error;
pub mod schema;
pub mod traits;
pub mod types;

pub use error::{Error, Result, Stage, StageContext};
pub use types::{AggregationRow, Dataset, EntityType, FactRow, Period, PeriodGranularity, SearchField, SearchRow};
