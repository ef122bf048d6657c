//! Config file inspection.

use std::fmt::Write;
use std::path::Path;

use crate::config::{self, Config};

/// Show where the config lives and what's in effect; optionally write defaults.
pub fn cmd_config(current: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if init {
        match &path {
            Some(p) if p.exists() => println!("Config already exists at {:?}", p),
            _ => {
                let written = config::save(&Config::default())?;
                println!("Wrote default config to {:?}", written);
            }
        }
        return Ok(());
    }

    print!("{}", describe(path.as_deref(), current)?);
    Ok(())
}

/// A commented header about the file at `path`, then `current` as TOML.
fn describe(path: Option<&Path>, current: &Config) -> anyhow::Result<String> {
    let mut out = String::new();
    match path {
        Some(p) if p.exists() => match config::load_from(p) {
            Ok(_) => writeln!(out, "# {}", p.display())?,
            Err(e) => {
                writeln!(out, "# {} is unusable, showing defaults", p.display())?;
                for line in e.to_string().lines() {
                    writeln!(out, "#   {line}")?;
                }
            }
        },
        Some(p) => writeln!(out, "# {} (not present, showing defaults)", p.display())?,
        None => writeln!(out, "# no config directory on this platform")?,
    }
    out.push_str(&toml::to_string_pretty(current)?);
    Ok(out)
}
