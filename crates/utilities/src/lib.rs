//!
//! General utility building blocks shared by the ATerm subsystem: a
//! free-list based protection set, a global test-serialization lock and a
//! couple of small marker types.
//!
//! This crate does not use unsafe code.

#![forbid(unsafe_code)]

pub mod global_guard;
pub mod helper;
pub mod protection_set;
pub mod test_utility;

pub use global_guard::*;
pub use helper::*;
pub use protection_set::*;
