pub mod config;
pub mod feature;
pub mod features;
pub mod gate;
pub mod logger;
pub mod processor;
