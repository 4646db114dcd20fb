use schemars::schema_for;

use crate::config::Config;

/// JSON Schema for `.missionbox.toml` / `.missionbox.json`.
pub fn config_schema() -> anyhow::Result<String> {
    let schema = schema_for!(Config);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Print the config JSON Schema to stdout.
pub fn run_schema() -> anyhow::Result<()> {
    println!("{}", config_schema()?);
    Ok(())
}
