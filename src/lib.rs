pub mod audio;
pub mod audio_api;
pub mod config;
pub mod generator;
pub mod pipeline;
pub mod session;
pub mod shared;
pub mod tui;
pub mod voice_agent;
