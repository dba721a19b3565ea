//! Tram network model and map renderer.
//!
//! Raw per-line records are parsed into [`network::line::TramLine`]s, merged
//! into a [`network::NetworkRegistry`], projected into map [`layer::Layer`]s
//! and composed into a single HTML document.

pub mod cache;
pub mod compose;
pub mod fetch;
pub mod layer;
pub mod network;
pub mod parse;
pub mod pipeline;
pub mod settings;
pub mod split;
