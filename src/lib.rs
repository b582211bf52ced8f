pub mod config;
pub mod distributions;
pub mod engine;
pub mod error;
pub mod events;
pub mod facility;
pub mod generator;
pub mod layout;
pub mod logging;
pub mod models;
pub mod occupancy;
pub mod output;
pub mod pathfinder;
pub mod policies;
pub mod state;
pub mod vehicle;
