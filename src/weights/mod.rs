//! Weight vectors and their on-disk format.

pub mod file;
pub mod vector;

pub use file::{format_weights, parse_weights, read_weight_list, read_weights, write_weights};
pub use vector::WeightVector;
