//! Playback-synchronization core for a retro player shell whose audio is
//! secretly routed to a remote streaming engine.
//!
//! The embedded GUI plays a silent placeholder file while the remote engine
//! produces the actual audio; the modules here keep the two clocks aligned
//! and feed the GUI enough synthetic state (progress, title, spectrum) to
//! sustain the illusion.

pub mod config;
pub mod placeholder;
pub mod playlist_loader;
pub mod protocol;
pub mod relay_client;
pub mod remote;
pub mod resolver;
pub mod session;
pub mod shell_bridge;
pub mod sync_controller;
pub mod visualizer;
