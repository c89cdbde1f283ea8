pub mod form;
pub mod store;
pub mod types;
