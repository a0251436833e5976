//! `repairnet config` - show the effective configuration

use super::context::CliContext;
use super::output::print_json;
use anyhow::{Context, Result};

pub fn run(ctx: &CliContext, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "config_path": ctx.config_path,
            "database_path": ctx.database_path,
            "config": ctx.config,
        }));
    }

    match &ctx.config_path {
        Some(path) => println!("# config: {}", path.display()),
        None => println!("# config: built-in defaults"),
    }
    println!("# database: {}", ctx.database_path.display());
    let rendered = toml::to_string_pretty(&ctx.config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
