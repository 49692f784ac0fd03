pub(crate) mod bootstrap;
mod chat;
mod config;
mod gameplay;
pub(crate) mod loop_runner;
