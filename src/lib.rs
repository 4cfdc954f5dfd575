//! OctoShop: upload a photo, get it restyled by a remote image-generation endpoint.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod poll;
pub mod render;
pub mod submit;
pub mod web;

#[cfg(test)]
mod testing;

pub use client::{InferenceClient, OctoAiClient};
pub use config::Config;
pub use error::{ErrorTier, OctoshopError};
pub use pipeline::{Octoshop, Presenter};
