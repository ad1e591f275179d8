#![forbid(unsafe_code)]

//! Query checking against the YouTube Data API.
//!
//! The core is split in two: [`reference`] decides whether user input points
//! at a specific video, and [`lookup`] issues the matching remote call and
//! normalizes the answer. Everything that talks to the network lives behind
//! the [`lookup::ResourceApi`] trait so the core can be driven by fakes.

pub mod config;
pub mod credentials;
pub mod error;
pub mod lookup;
pub mod reference;
pub mod security;
pub mod youtube;
