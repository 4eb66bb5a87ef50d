//! Configuration inspection command.
//!
//! Shows the effective value of every key together with the layer it came
//! from, a single value, the list of known keys, or the config file paths.

use crate::cli::ConfigArgs;
use crate::config::{
    CliOverrides, ConfigLayer, KNOWN_KEYS, PROJECT_CONFIG_FILE, load_config, load_project_config,
    load_user_config, user_config_path,
};
use crate::error::Result;
use crate::output::{OutputContext, SummaryTable};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSource {
    Default,
    User,
    Project,
    Environment,
}

impl ConfigSource {
    const fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user config",
            Self::Project => PROJECT_CONFIG_FILE,
            Self::Environment => "environment",
        }
    }
}

struct LayerWithSource {
    source: ConfigSource,
    layer: ConfigLayer,
}

fn build_layers(target: &Path) -> Result<Vec<LayerWithSource>> {
    Ok(vec![
        LayerWithSource {
            source: ConfigSource::User,
            layer: load_user_config()?,
        },
        LayerWithSource {
            source: ConfigSource::Project,
            layer: load_project_config(target)?,
        },
        LayerWithSource {
            source: ConfigSource::Environment,
            layer: ConfigLayer::from_env(),
        },
    ])
}

fn resolve_source(key: &str, layers: &[LayerWithSource]) -> ConfigSource {
    layers
        .iter()
        .rev()
        .find(|layer| layer.layer.get(key).is_some())
        .map_or(ConfigSource::Default, |layer| layer.source)
}

/// Execute the config command.
///
/// # Errors
///
/// Returns an error if a config file is malformed or a key is unknown.
pub fn execute(args: &ConfigArgs, ctx: &OutputContext) -> Result<()> {
    if args.path {
        return show_paths(&args.target, ctx);
    }
    if args.list {
        if ctx.is_json() {
            ctx.json(&json!({ "keys": KNOWN_KEYS }));
        } else {
            for key in KNOWN_KEYS {
                ctx.print(key);
            }
        }
        return Ok(());
    }

    let config = load_config(&args.target, &CliOverrides::default())?;
    if let Some(key) = &args.get {
        let value = config.get_display(key)?;
        if ctx.is_json() {
            ctx.json(&json!({ "key": key, "value": value }));
        } else {
            println!("{value}");
        }
        return Ok(());
    }

    let layers = build_layers(&args.target)?;
    let mut entries = BTreeMap::new();
    for key in KNOWN_KEYS {
        let value = config.get_display(key)?;
        let source = resolve_source(key, &layers);
        debug!(key, source = source.label(), "Resolved config value");
        entries.insert(*key, (value, source));
    }

    if ctx.is_json() {
        let values: BTreeMap<&str, serde_json::Value> = entries
            .iter()
            .map(|(key, (value, source))| {
                (*key, json!({ "value": value, "source": source.label() }))
            })
            .collect();
        ctx.json(&values);
        return Ok(());
    }
    let mut table = SummaryTable::new(format!("Configuration for {}", config.target.display()));
    for (key, (value, source)) in &entries {
        table.row(*key, format!("{value}  ({})", source.label()));
    }
    ctx.table(&table);
    Ok(())
}

fn show_paths(target: &Path, ctx: &OutputContext) -> Result<()> {
    let user = user_config_path();
    let project = target.join(PROJECT_CONFIG_FILE);
    if ctx.is_json() {
        ctx.json(&json!({
            "user_config": user.as_ref().map(|p| p.display().to_string()),
            "project_config": project.display().to_string(),
        }));
        return Ok(());
    }
    let status = |path: &Path| if path.exists() { "exists" } else { "not found" };
    match &user {
        Some(path) => ctx.print(&format!("User config: {} ({})", path.display(), status(path))),
        None => ctx.print("User config: (none)"),
    }
    ctx.print(&format!(
        "Project config: {} ({})",
        project.display(),
        status(&project)
    ));
    Ok(())
}
