#![forbid(unsafe_code)]

pub mod broadcaster;
pub mod connection;
pub mod hub;
pub mod listener;
pub mod registry;


#[cfg(test)]
mod registry_tests;

#[cfg(test)]
mod ws_smoke_tests;
