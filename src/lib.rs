//! Client core for a shared notebook workspace: chat transcript, source
//! selection and artifacts kept in step with the server over a push channel.

pub mod api;
pub mod app;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod reconcile;
pub mod session;
pub mod sync;
