//! List catalog contents.

use std::path::Path;
use std::time::Duration;

use crate::player::format_duration;
use crate::resolver::CatalogResolver;

/// Print every track in the catalog, as a table or JSON.
pub fn cmd_catalog(path: &Path, json: bool) -> anyhow::Result<()> {
    let resolver = CatalogResolver::load(path)?;
    let tracks = resolver.tracks();

    if json {
        println!("{}", serde_json::to_string_pretty(tracks)?);
        return Ok(());
    }

    println!("Catalog: {:?}", path);
    println!("{} tracks", tracks.len());
    println!();
    for (i, track) in tracks.iter().enumerate() {
        let length = track
            .duration_secs
            .map(|s| format_duration(Duration::from_secs(s)))
            .unwrap_or_else(|| "?:??".to_string());
        println!("{:>4}. {} [{}]", i + 1, track.display_title(), length);
        println!("      {}", track.source_ref);
    }
    Ok(())
}
