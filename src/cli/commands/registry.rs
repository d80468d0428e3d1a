use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::registry::{CollectionDescriptor, FieldDescriptor, Registry};

#[derive(Subcommand)]
pub enum RegistryCommands {
    #[command(about = "Validate a registry file and report what it declares")]
    Check {
        #[arg(help = "Path to the registry YAML file")]
        path: PathBuf,
    },

    #[command(about = "Print every collection with its fields and search fields")]
    Show {
        #[arg(help = "Path to the registry YAML file")]
        path: PathBuf,
    },
}

pub fn handle(cmd: RegistryCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        RegistryCommands::Check { path } => {
            let registry = Registry::load(&path)?;
            let fields: usize = registry.iter().map(|c| c.fields.len()).sum();

            match output_format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "valid": true,
                        "collections": registry.len(),
                        "fields": fields,
                    }))?
                ),
                OutputFormat::Text => println!(
                    "✓ {} is valid: {} collections, {} fields",
                    path.display(),
                    registry.len(),
                    fields
                ),
            }
            Ok(())
        }
        RegistryCommands::Show { path } => {
            let registry = Registry::load(&path)?;

            match output_format {
                OutputFormat::Json => {
                    let collections: Vec<&CollectionDescriptor> = registry.iter().map(|c| c.as_ref()).collect();
                    println!("{}", serde_json::to_string_pretty(&collections)?);
                }
                OutputFormat::Text => {
                    for collection in registry.iter() {
                        print!("{}", describe(collection));
                    }
                }
            }
            Ok(())
        }
    }
}

fn describe(collection: &CollectionDescriptor) -> String {
    let mut out = format!("{}\n", collection.name);
    for field in &collection.fields {
        out.push_str(&format!("  {}\n", describe_field(field)));
    }
    if !collection.search_fields.is_empty() {
        out.push_str(&format!("  search: {}\n", collection.search_fields.join(", ")));
    }
    out
}

fn describe_field(field: &FieldDescriptor) -> String {
    let mut line = format!("{:<16} {:<10} {}", field.key, field.kind.tag(), field.label);
    if field.required {
        line.push_str(" (required)");
    }
    if let Some(options) = field.kind.options() {
        line.push_str(&format!(" [{}]", options.join(" | ")));
    }
    if let Some(target) = field.kind.foreign_ref() {
        line.push_str(&format!(" -> {}.{}", target.collection, target.display_key));
    }
    line
}
