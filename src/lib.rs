pub mod config;
pub mod db;
pub mod escalation;
pub mod fingerprint;
pub mod grouping;
pub mod index;
pub mod logging;
pub mod overrides;
pub mod scanner;
