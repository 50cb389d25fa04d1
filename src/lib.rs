#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod aixm;
pub mod error;
pub mod geo;
pub mod hazard;
pub mod nav;
pub mod zip_util;

pub use crate::aixm::{ingest, Dataset, Options, OptionsBuilder, Strictness};
pub use crate::error::{Error, Result};
pub use crate::geo::LatLon;
