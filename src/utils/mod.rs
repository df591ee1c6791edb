//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a generational [`Arena`] that stores task
//! records and hands out stable keys used as task identities.

mod arena;

pub(crate) use arena::{Arena, ArenaIndex};
