//! Amrkit is the spatial core of a block-structured adaptive mesh refinement
//! (AMR) toolkit. It represents hierarchies of overlapping uniform grids in
//! the style of Berger-Oliger AMR: levels of increasing resolution, where
//! fine blocks cover parts of coarser ones and same-level blocks may share
//! layers of ghost cells. On top of that representation it provides
//! recursive-bisection partitioning of index space, box intersection tests
//! across levels, ghost classification with stripping and blanking,
//! axis-aligned slicing, and the collective exchange that extends those to
//! hierarchies spread over several processes.
//!
//! Rendering, file formats and the transport underneath the `Communicator`
//! trait are left to the caller.

pub mod amr_box;
pub mod block_store;
pub mod distributed;
pub mod error;
pub mod extent;
pub mod ghost;
pub mod grid;
pub mod hierarchy;
pub mod message;
pub mod overlap;
pub mod partition;
pub mod slice;
pub mod source;

pub use error::{Error, Result};
