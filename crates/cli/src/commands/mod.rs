pub mod documents;
pub mod query;
