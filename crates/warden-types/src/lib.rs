pub mod config;
pub mod manifest;
pub mod request;
pub mod run;
pub mod turn;
