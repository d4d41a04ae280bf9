// src/lib.rs — Library root for chatkeep

pub mod backend;
pub mod cli;
pub mod infra;
pub mod retry;
pub mod session;
pub mod transport;
pub mod ui;
