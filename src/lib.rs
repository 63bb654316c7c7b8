//! Plaza room client core
//!
//! The session coordinator for a shared virtual space: local locomotion,
//! remote pose reconciliation, proximity voice, station seating, and
//! quick-play matchmaking, all driven by one cooperative tick loop.
//!
//! A UI embeds this crate, drives it through [`room::RoomHandle`], and polls
//! [`room::RoomView`] each frame; the bundled binary runs the same
//! coordinator headless against a relay.

pub mod app;
pub mod config;
pub mod room;
pub mod util;
pub mod ws;
