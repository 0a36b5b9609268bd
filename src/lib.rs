//! A minimal task tracker: a JSON API over an SQLite store, and a terminal
//! client that lists, filters, creates, updates and deletes todos through it.

#[macro_use]
extern crate prettytable;

pub mod api;
pub mod cli;
pub mod client;
pub mod error;
pub mod interface;
pub mod model;
pub mod store;
