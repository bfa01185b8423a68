//! Core of a picture-in-picture video browser: paged list generators, a tab
//! registry that renders them, coupled control/video window geometry, and a
//! persisted subscription set with a cached feed.

pub mod app;
pub mod bounds;
pub mod config;
pub mod constants;
pub mod controller;
pub mod disk_cache;
pub mod error;
pub mod feed_cache;
pub mod generator;
pub mod gestures;
pub mod import;
pub mod item;
pub mod logging;
pub mod navigation;
pub mod player;
pub mod source;
pub mod subscription;
pub mod tab;
pub mod transport;
pub mod youtube;
