//! Library crate backing the `handoff` CLI: capture an in-progress AI coding
//! assistant session from whichever tool produced it, normalize it into a
//! `CanonicalSession`, compress it to fit a target budget, and render it as a
//! resume prompt for a different assistant to pick up.
//!
//! `main.rs` is a thin CLI wrapper over the modules here; everything in this
//! crate is also usable as a library with no dependency on `clap` or stdio.

pub mod adapters;
pub mod analyzer;
pub mod compress;
pub mod config;
pub mod enrich;
pub mod error;
pub mod model;
pub mod pathhash;
pub mod prompt;
pub mod registry;
pub mod validate;
pub mod watcher;
