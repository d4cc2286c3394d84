//! Command implementations for the meshctl CLI.

pub mod config;
pub mod connectivity;
pub mod extensions;
pub mod sysdump;
