#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::comparison_chain, clippy::float_cmp, clippy::collapsible_else_if,
         clippy::field_reassign_with_default, clippy::new_without_default)]

pub mod error;
pub mod options;
pub mod session;
pub mod shader;
pub mod scene;
pub mod mesh;
pub mod color;
pub mod trace;
pub mod lights;
pub mod sample;
pub mod luxel;
pub mod illum;
pub mod bounce;
pub mod grid;
pub mod compile;

pub use compile::LightCompiler;
pub use error::LightError;
pub use options::LightOptions;
pub use scene::Scene;
pub use session::{CompileSession, LightStats};

#[cfg(test)]
pub(crate) mod testutil;
#[cfg(test)]
mod scenarios;
