//! Generic utility primitives with no pipeline knowledge.
//!
//! - `artifact` - Local artifact lookup and file naming
//! - `io` - File reads with consistent error handling
//! - `shell` - Shell escaping and quoting
//! - `template` - Package name rendering
//! - `validation` - Input validation helpers

pub mod artifact;
pub mod io;
pub mod shell;
pub mod template;
pub mod validation;
