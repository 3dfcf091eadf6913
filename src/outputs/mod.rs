//! Output generation for `digest` runs.
//!
//! # Submodules
//!
//! - [`json`]: Writes a `RegionalDigest` to a dated JSON file
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! ├── 2025-05-06/
//! │   ├── punjab_morning.json
//! │   └── punjab_evening.json
//! ```

pub mod json;
