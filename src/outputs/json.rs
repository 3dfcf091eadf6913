//! JSON digest output.
//!
//! Files are organized by date, one file per query and edition:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── punjab_morning.json
//!     └── tamil-nadu_evening.json
//! ```

use crate::models::RegionalDigest;
use crate::utils::slugify_title;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RegionalDigest`] under `json_output_dir` and return the file path.
///
/// The file is written to: `{json_output_dir}/{date}/{query-slug}_{time_of_day}.json`
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_digest(
    digest: &RegionalDigest,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(digest)?;

    let full_json_dir = PathBuf::from(json_output_dir).join(&digest.local_date);
    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename = full_json_dir.join(format!(
        "{}_{}.json",
        slugify_title(&digest.query),
        digest.time_of_day
    ));
    fs::write(&output_json_filename, json).await?;
    info!(
        path = %output_json_filename.display(),
        articles = digest.articles.len(),
        "Wrote JSON digest"
    );

    Ok(output_json_filename)
}
