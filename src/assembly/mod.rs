//! Graph assembly and reference resolution.
//!
//! [`Assembler`] turns a class's flattened node records into linked instance
//! graphs: states are mapped first (recursing into nested state machines),
//! then transitions are wired against them. Reference nodes are handed to
//! the resolver, which either shares one instance per class (reuse) or builds
//! one per reference site and refuses to recurse into a class that is
//! already being built.

mod assembler;
mod error;
mod resolver;

pub use assembler::{Assembler, Assembly, AssemblyReport};
pub use error::AssemblyError;
pub use resolver::{Generation, Resolution};
