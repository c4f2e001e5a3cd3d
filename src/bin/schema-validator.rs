//! # SCIM Schema Validator
//!
//! Checks SCIM schema files against the structural rules the schema registry
//! enforces at registration, so a schema that passes here loads into
//! `SchemaRegistry::from_schema_dir` unchanged.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin schema-validator schemas/Device.json
//! cargo run --bin schema-validator ./schemas/
//! ```
//!
//! ## Rules
//!
//! - The file must be a JSON object with `id`, `name` and `attributes`
//! - The schema id must be a URN and the name non-empty
//! - Attribute names are non-empty and unique among their siblings
//!   (case-insensitive)
//! - Complex attributes declare sub-attributes; other attributes declare none
//! - Complex attributes are not nested inside complex attributes
//!
//! For a directory, every `*.json` file is checked on its own, then the whole
//! set is loaded into one registry to catch duplicate schema ids.
//!
//! ## Exit Codes
//!
//! - `0`: All schemas are valid
//! - `1`: One or more schemas are invalid or could not be read

use scim_engine::schema::{AttributeType, Schema, SchemaRegistry};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <schema-file-or-directory>", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  {} schemas/Device.json", args[0]);
        eprintln!("  {} ./schemas/", args[0]);
        process::exit(1);
    }

    let path = Path::new(&args[1]);

    let ok = if path.is_file() {
        validate_single_file(path)
    } else if path.is_dir() {
        validate_directory(path)
    } else {
        eprintln!(
            "Error: '{}' is not a valid file or directory",
            path.display()
        );
        false
    };

    if !ok {
        process::exit(1);
    }
}

fn validate_single_file(file_path: &Path) -> bool {
    println!("Validating schema file: {}", file_path.display());

    match load_and_check(file_path) {
        Ok(schema) => {
            println!("✓ Schema is valid!");
            print_schema_summary(&schema);
            true
        }
        Err(e) => {
            eprintln!("❌ Schema validation failed: {}", e);
            false
        }
    }
}

fn validate_directory(dir_path: &Path) -> bool {
    println!("Validating schemas in directory: {}", dir_path.display());

    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error reading directory: {}", e);
            return false;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut valid_count = 0;
    let mut error_count = 0;
    for path in &paths {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        println!("\nValidating: {}", file_name);

        match load_and_check(path) {
            Ok(schema) => {
                println!("  ✓ Valid - {} ({})", schema.name, schema.id);
                valid_count += 1;
            }
            Err(e) => {
                eprintln!("  ❌ Invalid - {}", e);
                error_count += 1;
            }
        }
    }

    println!("\nValidation Summary:");
    println!("  Valid schemas: {}", valid_count);
    println!("  Invalid schemas: {}", error_count);

    if error_count > 0 {
        return false;
    }

    println!("\nTesting schema registry loading...");
    match SchemaRegistry::from_schema_dir(dir_path) {
        Ok(registry) => {
            println!("✓ Schema registry loaded successfully");
            println!("  Total schemas loaded: {}", registry.schemas().len());
            for schema in registry.schemas() {
                println!("    - {} ({})", schema.name, schema.id);
            }
            for resource_type in registry.resource_types() {
                println!(
                    "  Resource type: {} at {}",
                    resource_type.name, resource_type.endpoint
                );
            }
            true
        }
        Err(e) => {
            eprintln!("❌ Failed to load schema registry: {}", e);
            false
        }
    }
}

fn load_and_check(file_path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path)?;

    let json_value: serde_json::Value = serde_json::from_str(&content)?;
    let obj = json_value
        .as_object()
        .ok_or("Schema must be a JSON object")?;
    for field in ["id", "name", "attributes"] {
        if !obj.contains_key(field) {
            return Err(format!("Schema missing required '{}' field", field).into());
        }
    }

    let schema = SchemaRegistry::load_schema_from_str(&content, &file_path.display().to_string())?;
    SchemaRegistry::check_schema(&schema)?;
    Ok(schema)
}

fn print_schema_summary(schema: &Schema) {
    println!();
    println!("Schema Summary:");
    println!("  ID: {}", schema.id);
    println!("  Name: {}", schema.name);
    println!("  Description: {}", schema.description);
    println!("  Attributes: {}", schema.attributes.len());

    let mut type_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for attr in &schema.attributes {
        *type_counts.entry(attr.data_type.as_str()).or_insert(0) += 1;
    }

    let required: Vec<&str> = schema
        .attributes
        .iter()
        .filter(|attr| attr.required)
        .map(|attr| attr.name.as_str())
        .collect();
    let multi_valued = schema.attributes.iter().filter(|a| a.multi_valued).count();
    let complex = schema
        .attributes
        .iter()
        .filter(|a| a.data_type == AttributeType::Complex)
        .count();

    println!("  Required attributes: {}", required.len());
    println!("  Multi-valued attributes: {}", multi_valued);
    println!("  Complex attributes: {}", complex);
    println!("  Attribute types:");
    for (attr_type, count) in type_counts {
        println!("    - {}: {}", attr_type, count);
    }

    if !required.is_empty() {
        println!("  Required attribute names: {}", required.join(", "));
    }
}
