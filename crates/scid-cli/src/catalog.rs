use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use scid_core::Catalog;

/// Load the track/profile catalog from a JSON file.
///
/// Without a path the catalog is empty: stream logging then fails with
/// `TrackNotFound` and the backfill jobs find nothing to do.
pub fn load_catalog(path: Option<&Path>) -> anyhow::Result<Arc<Catalog>> {
    let Some(path) = path else {
        warn!("no --catalog provided, using an empty catalog");
        return Ok(Arc::new(Catalog::default()));
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog from {}", path.display()))?;
    let catalog = Catalog::from_json(&json)
        .map_err(|e| anyhow::anyhow!("parsing catalog {}: {e}", path.display()))?;
    info!(path = %path.display(), "catalog loaded");
    Ok(Arc::new(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scid_core::TrackDirectory;

    #[test]
    fn missing_path_gives_empty_catalog() {
        let c = load_catalog(None).unwrap();
        assert!(c.tracks().unwrap().is_empty());
    }

    #[test]
    fn reads_catalog_file() {
        let path = std::env::temp_dir().join("scid_cli_catalog_test.json");
        std::fs::write(
            &path,
            r#"{ "tracks": [ { "track_id": "t1", "profile_id": "p1" } ], "profiles": [] }"#,
        )
        .unwrap();
        let c = load_catalog(Some(&path)).unwrap();
        assert_eq!(c.tracks().unwrap().len(), 1);
        assert!(load_catalog(Some(Path::new("/nonexistent/catalog.json"))).is_err());
    }
}
