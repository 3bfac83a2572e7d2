pub mod config;
pub mod errors;
pub mod llm;
pub mod sandbox;
pub mod scaffold;
pub mod server;
pub mod telemetry;
pub mod util;
