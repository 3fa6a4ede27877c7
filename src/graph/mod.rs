//! Computation graph module containing scalar nodes and the backward engine
//!
//! This module provides the arena-backed `Graph`, its node handles, the
//! arithmetic operators that build it and the activations layered on top.

mod core;
pub mod ops;

pub use self::core::{Exponent, Graph, IntoNode, Node, NodeId, Op};
