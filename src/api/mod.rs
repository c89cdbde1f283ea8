// HTTP boundaries: subject list, single-image upload and the shared client.

pub mod client;
pub mod error;
pub mod multipart;
pub mod subjects;
pub mod upload;

pub use client::ApiClient;
