//! Core types shared by the library and the `botd` binary.

pub mod config;
pub mod error;
