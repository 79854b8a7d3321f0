//! Terminal hex-map marker board.
//!
//! Displays a large tiled map image with pan/zoom, toggles colored
//! markers on a predefined hex-grid location set, persists markers to
//! an HTTP backend and exports a flattened high-resolution PNG.

pub mod app;
pub mod config;
pub mod data;
pub mod export;
pub mod markers;
pub mod persist;
pub mod ui;
pub mod view;
