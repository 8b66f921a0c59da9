

//! Read and write Sparse Image Format (SIF) files.
//!
//! SIF stores large, multi-band raster images tiled, and collapses every
//! tile band whose pixels are all identical into a single pixel value in
//! the tile's header, releasing its data block. The size of a file scales
//! with the non-uniform area of the image instead of its full area, while
//! every rectangular region stays randomly accessible for reading and
//! writing.
//!
//! This library uses no foreign code or unsafe Rust.
//!
//! Start with [`SifFile::create`] and [`SifFile::open`] for raw pixel
//! bytes, or with the [`simple`] module for files that declare a sample
//! type and byte order.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    missing_copy_implementations,
    trivial_numeric_casts,
    redundant_semicolons
)]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod math;
pub mod io;
pub mod meta;
pub mod tile;
pub mod block;
pub mod uniform;
pub mod metadata;
pub mod file;
pub mod simple;

/// Export the most important items from `sif`.
/// _Note: This includes a type called `Result`, possibly overwriting the default `std::Result` type usage._
pub mod prelude {

    pub use crate::error::{error_description, Error, ErrorKind, Result, UnitResult};
    pub use crate::file::{is_possibly_sif_file, SifFile, UniformValue};
    pub use crate::io::ByteOrder;
    pub use crate::meta::{magic_number, Header, ImageDescription, LIBRARY_VERSION};
    pub use crate::simple::{self, SampleType};

    // common math
    pub use crate::math::Vec2;

    // re-export external stuff
    pub use smallvec::SmallVec;
}
