//! ArUco/AprilTag marker dictionaries and decoding.
//!
//! Dictionaries come from code tables compiled in from `data/`, or from
//! JSON tables in a directory at runtime. Decoding works on square cells
//! supplied by the caller (for ChArUco boards, the cells of the detected
//! checkerboard lattice); there is no free-standing quad detector.

mod builtins;
mod dictionary;
mod matcher;
mod scan;
mod threshold;

pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code, Match, Matcher};
pub use scan::{decode_markers_in_cells, DecodeConfig, MarkerCell, MarkerDetection};
