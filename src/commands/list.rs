use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::Context;
use crate::bundle::{BundleSource, DirectoryBundles};
use crate::config::InstallerConfig;
use crate::ui;

/// Title of a bundle as written in its descriptor, without rendering it
fn title(bundles: &dyn BundleSource, name: &str) -> Option<String> {
    let raw = bundles.descriptor(name).ok()??;
    let value: Value = serde_json::from_str(&raw).ok()?;
    value
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn run(ctx: &Context) -> Result<()> {
    let config = InstallerConfig::load()?;
    let root = config.bundles_path()?;
    let bundles = DirectoryBundles::new(&root);
    let names = bundles.names()?;

    if names.is_empty() {
        ui::info(&format!("No bundles in {}", root.display()));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Bundles ({})", names.len()));
    }
    for name in &names {
        match title(&bundles, name) {
            Some(title) => println!("  {} {}", name.bold(), title.dimmed()),
            None => println!("  {}", name.bold()),
        }
    }
    Ok(())
}
