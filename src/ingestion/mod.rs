//! Sales ingestion - fetch, parse, enrich and write recorded sales into the
//! sales history queried for comparables and market insights

pub mod enrich;
pub mod fetch;
pub mod parse;
pub mod types;
pub mod utils;
pub mod write;

pub use types::*;
