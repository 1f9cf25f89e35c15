#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::comparison_chain, clippy::float_cmp, clippy::collapsible_else_if,
         clippy::field_reassign_with_default)]

pub mod q_shared;
pub mod qfiles;
pub mod common;
pub mod cvar;
pub mod bspworld;
pub mod entities;
