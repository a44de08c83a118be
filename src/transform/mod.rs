//! Narrow interfaces over the wrapped tools.
//!
//! Every transform in here is an opaque `input -> output | error` function
//! from the pipeline's point of view. The task graph only decides *when*
//! each one runs and *where* its inputs and outputs live.

pub mod critical;
pub mod css;
pub mod fonts;
pub mod html;
pub mod images;
pub mod scripts;
pub mod styles;
