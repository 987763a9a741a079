//! Wire schemas of every endpoint family and the pure translations between
//! them. Nothing in here performs I/O.

pub mod anthropic_types;
pub mod google_types;
pub mod image_types;
pub mod images;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod responses;
pub mod responses_types;
pub mod streaming;
