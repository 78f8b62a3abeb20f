pub mod codec;
pub mod engine;
pub mod execution;
pub mod index;
pub mod parser;
pub mod plan;
pub mod row;
pub mod schema;
pub mod types;
