pub mod archive;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod ignore;
pub mod ledger;
pub mod models;
pub mod persistence;
pub mod restore;
pub mod routes;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod transfer;
