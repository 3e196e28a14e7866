pub mod client;
pub mod protocol;

pub use client::{FaceServiceClient, UNVERIFIED_IDENTITY};
