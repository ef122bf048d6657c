//! Timestamp parsing check.

use crate::player::format_duration;
use crate::timestamp::parse_timestamp;

/// Print how `seek` would interpret a timestamp.
pub fn cmd_parse_time(input: &str) -> anyhow::Result<()> {
    let offset = parse_timestamp(input)?;
    println!("{} ({:.3}s)", format_duration(offset), offset.as_secs_f64());
    Ok(())
}
