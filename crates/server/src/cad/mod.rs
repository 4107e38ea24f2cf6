//! Primitive-combination CAD: scene evaluation and the script sandbox.

pub mod build;
pub mod script;

pub use build::BuildError;
pub use script::ScriptError;
