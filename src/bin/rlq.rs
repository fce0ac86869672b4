use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use reliquary::codec::{self, JsonCodec};
use reliquary::path as tree_path;
use reliquary::storage;
use reliquary::struct_type::CLASS_KEY;
use reliquary::{Archive, NodeRef};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Parser)]
#[command(name = "rlq")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Show {
        file: String,
    },
    Get {
        file: String,
        path: String,
    },
    Set {
        file: String,
        path: String,
        value: String,
        /// Store the value as a string even if it parses as a number.
        #[arg(long)]
        string: bool,
    },
    Clear {
        file: String,
        path: String,
    },
    Convert {
        input: String,
        output: String,
    },
    Digest {
        file: String,
    },
    Objects {
        file: String,
        #[arg(long)]
        json: bool,
        /// Fail if any stored object lacks a class.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Serialize)]
struct ObjectSummary {
    identifier: String,
    class: Option<String>,
    fields: usize,
    links: Vec<String>,
}

fn print_node(node: NodeRef<'_>) -> Result<()> {
    let json = JsonCodec::to_json(node)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn summarize(archive: &Archive) -> Vec<ObjectSummary> {
    let root = archive.root();
    let identifiers: BTreeSet<&str> = root.keys().collect();

    root.entries()
        .map(|(identifier, node)| ObjectSummary {
            identifier: identifier.to_string(),
            class: node.index(CLASS_KEY).get(),
            fields: node.entries().filter(|(key, _)| *key != CLASS_KEY).count(),
            links: node
                .entries()
                .filter(|(key, _)| *key != CLASS_KEY)
                .filter_map(|(key, value)| {
                    let target = value.get::<String>()?;
                    identifiers
                        .contains(target.as_str())
                        .then(|| format!("{} -> {}", key, target))
                })
                .collect(),
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Show { file } => {
            let archive = storage::load(&file)?;
            print_node(archive.root())?;
        }

        Commands::Get { file, path } => {
            let archive = storage::load(&file)?;
            print_node(tree_path::lookup(archive.root(), &path)?)?;
        }

        Commands::Set {
            file,
            path,
            value,
            string,
        } => {
            let mut archive = if storage::exists(&file) {
                storage::load(&file)?
            } else {
                Archive::new()
            };

            let root = archive.root_id();
            let id = tree_path::lookup_mut(&mut archive, root, &path)?;
            let mut node = archive.node_mut(id);
            if string {
                node.set(value.as_str());
            } else if let Ok(n) = value.parse::<i64>() {
                node.set(n);
            } else if let Ok(f) = value.parse::<f64>() {
                node.set(f);
            } else {
                node.set(value.as_str());
            }

            storage::save(&file, &archive)?;
            println!("Set '{}' = '{}' in {}", path, value, file);
        }

        Commands::Clear { file, path } => {
            let mut archive = storage::load(&file)?;
            let root = archive.root_id();
            let id = tree_path::lookup_mut(&mut archive, root, &path)?;
            archive.node_mut(id).clear();
            storage::save(&file, &archive)?;
            println!("Cleared '{}' in {}", path, file);
        }

        Commands::Convert { input, output } => {
            let archive = storage::load(&input)?;
            storage::save(&output, &archive)?;
            println!("Converted {} -> {}", input, output);
        }

        Commands::Digest { file } => {
            let archive = storage::load(&file)?;
            let digest = codec::digest(archive.root());
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}", hex);
        }

        Commands::Objects { file, json, strict } => {
            let archive = storage::load(&file)?;
            if !archive.root().is_map() {
                bail!("{} does not hold an object map", file);
            }

            let objects = summarize(&archive);
            if json {
                println!("{}", serde_json::to_string_pretty(&objects)?);
            } else {
                for object in &objects {
                    println!(
                        "{} - {} ({} fields)",
                        object.identifier,
                        object.class.as_deref().unwrap_or("<no class>"),
                        object.fields
                    );
                    for link in &object.links {
                        println!("    {}", link);
                    }
                }
            }

            let missing = objects.iter().filter(|o| o.class.is_none()).count();
            if strict && missing > 0 {
                bail!("{} objects without a class", missing);
            }
        }
    }

    Ok(())
}
