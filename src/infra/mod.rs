pub mod db;
pub mod error;
pub mod fs;
pub mod http;
pub mod publish;
pub mod telemetry;
