use anyhow::{Context, Result, bail};
use clap::Parser;
use jarview::archive::{JarArchive, has_supported_extension};
use jarview::cli::{Cli, Commands, OutputFormat};
use jarview::engine::SkeletonEngine;
use jarview::options::{self, TIMEOUT_KEY};
use jarview::resolve::normalize_class_path;
use jarview::session::Session;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List { archive, format } => {
            let archive = open_archive(&archive)?;
            write_list_output(&archive, format)?;
        }
        Commands::Show {
            archive,
            entry_path,
            output,
        } => {
            let mut session = Session::new(Arc::new(SkeletonEngine::new()));
            session.load_archive(&archive)?;
            let content = session.open(&entry_path)?;
            write_output(&content, output.as_deref())?;
        }
        Commands::Decompile {
            archive,
            class_name,
            set,
            format,
            code_only,
            output,
        } => {
            let mut session = Session::new(Arc::new(SkeletonEngine::new()));
            let loaded = session.load_archive(&archive)?;

            let overrides = parse_overrides(&set)?;
            if !overrides.is_empty() {
                session.coordinator().set_options(&overrides);
            }

            let start = Instant::now();
            let entry_path = normalize_class_path(&class_name);
            let content = session.open(&entry_path)?;
            let result = DecompileOutput {
                class_name: entry_path.trim_end_matches(".class").replace('/', "."),
                archive: loaded.path().to_string_lossy().to_string(),
                entry_path,
                duration_ms: start.elapsed().as_millis() as u64,
                timeout_ms: options::timeout_ms(&session.get_options()),
                success: !content.starts_with("// Error:"),
                content,
            };

            let effective_format = if code_only { OutputFormat::Code } else { format };
            let rendered = match effective_format {
                OutputFormat::Json => serde_json::to_string_pretty(&result)?,
                OutputFormat::Text => {
                    let mut out = String::new();
                    out.push_str(&format!("class_name: {}\n", result.class_name));
                    out.push_str(&format!("entry_path: {}\n", result.entry_path));
                    out.push_str(&format!("duration_ms: {}\n", result.duration_ms));
                    out.push_str(&format!("success: {}\n\n", result.success));
                    out.push_str(&result.content);
                    out
                }
                OutputFormat::Code => result.content.clone(),
            };
            write_output(&rendered, output.as_deref())?;

            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Options { format } => {
            write_options_output(format)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct DecompileOutput {
    class_name: String,
    archive: String,
    entry_path: String,
    duration_ms: u64,
    timeout_ms: u64,
    success: bool,
    content: String,
}

fn open_archive(path: &PathBuf) -> Result<JarArchive> {
    if !has_supported_extension(path) {
        bail!("Please open a valid .jar, .zip, or .war file.");
    }
    JarArchive::open(path)
}

fn parse_overrides(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --set value (expected KEY=VALUE): {pair}"))?;
        let key = key.trim();
        let value = value.trim();
        options::validate_override(key, value)?;
        overrides.insert(key.to_string(), value.to_string());
    }
    Ok(overrides)
}

fn write_list_output(archive: &JarArchive, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(archive.entries())?);
        }
        _ => {
            for entry in archive.entries() {
                println!("{}", entry.path);
            }
        }
    }
    Ok(())
}

fn write_options_output(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(options::catalogue())?);
        }
        _ => {
            for spec in options::catalogue() {
                println!(
                    "{:<22} {:<9} default={:<9} {}",
                    spec.key,
                    format!("{:?}", spec.kind).to_lowercase(),
                    spec.default,
                    spec.description
                );
            }
        }
    }
    Ok(())
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_overrides_splits_and_validates() {
        let pairs = vec![
            "showversion=false".to_string(),
            "decompiletimeout=250".to_string(),
        ];
        let overrides = parse_overrides(&pairs).unwrap();
        assert_eq!(overrides.get("showversion").map(String::as_str), Some("false"));
        assert_eq!(overrides.get(TIMEOUT_KEY).map(String::as_str), Some("250"));

        assert!(parse_overrides(&["nosucheq".to_string()]).is_err());
        assert!(parse_overrides(&["nosuchoption=true".to_string()]).is_err());
        assert!(parse_overrides(&["showversion=maybe".to_string()]).is_err());
    }
}
