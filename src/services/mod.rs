//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own store access and quota logic so route handlers stay
//! focused on request parsing, cookies and status mapping.

pub mod conversation;
pub mod counter;
pub mod reaper;
pub mod session;
pub mod staging;
pub mod transfer;
