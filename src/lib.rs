pub mod collector;
pub mod config;
pub mod emitter;
pub mod hostname;
pub mod sample;
pub mod scheduler;
pub mod sink;
