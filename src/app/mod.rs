pub mod application;
pub mod aws;
pub mod cli;
pub mod env;
pub mod runner;
