//! Viewer session: open tabs, content routing, failure rendering.
//!
//! Class-backed entries go through the coordinator's decompile pipeline;
//! everything else renders as plain text. Failures are rendered in place as
//! a comment marker instead of source text, never dropped silently, and a
//! timeout carries a remediation hint.

use crate::archive::{JarArchive, has_supported_extension};
use crate::coordinator::{Coordinator, DecompileError};
use crate::engine::DecompileEngine;
use crate::resolve::ArchiveSlot;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const TEXT_TRUNCATE_LIMIT: usize = 500_000;
const TIMEOUT_TIP: &str = "\n\n// Tip: Increase decompiletimeout in Options";

pub struct Session {
    slot: ArchiveSlot,
    coordinator: Coordinator,
    open_tabs: Vec<String>,
    active: Option<String>,
}

impl Session {
    pub fn new(engine: Arc<dyn DecompileEngine>) -> Self {
        let slot = ArchiveSlot::new();
        let coordinator = Coordinator::new(engine, slot.clone());
        Self {
            slot,
            coordinator,
            open_tabs: Vec::new(),
            active: None,
        }
    }

    /// Replaces the current archive. Open tabs reference entries of the old
    /// archive and are closed; resolutions arriving from in-flight requests
    /// resolve against the new archive from this point on.
    pub fn load_archive(&mut self, path: &Path) -> Result<Arc<JarArchive>> {
        if !has_supported_extension(path) {
            bail!("Please open a valid .jar, .zip, or .war file.");
        }
        let archive = self.slot.load(path)?;
        self.open_tabs.clear();
        self.active = None;
        Ok(archive)
    }

    pub fn archive(&self) -> Option<Arc<JarArchive>> {
        self.slot.archive()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn open_tabs(&self) -> &[String] {
        &self.open_tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Opens (or re-activates) a tab and returns its rendered content.
    pub fn open(&mut self, entry_path: &str) -> Result<String> {
        if !self.open_tabs.iter().any(|p| p == entry_path) {
            self.open_tabs.push(entry_path.to_string());
        }
        self.active = Some(entry_path.to_string());
        self.render(entry_path)
    }

    pub fn close(&mut self, entry_path: &str) {
        self.open_tabs.retain(|p| p != entry_path);
        if self.active.as_deref() == Some(entry_path) {
            self.active = self.open_tabs.last().cloned();
        }
    }

    pub fn get_options(&self) -> BTreeMap<String, String> {
        self.coordinator.get_options()
    }

    /// Merges option overrides and re-renders the active tab when it is
    /// class-backed, mirroring the options-saved flow. Returns the fresh
    /// content, or `None` when there was nothing to reload.
    pub fn update_options(&self, overrides: &BTreeMap<String, String>) -> Option<String> {
        self.coordinator.set_options(overrides);
        self.reload_active()
    }

    /// Re-runs decompilation for the active tab. No-op (returns `None`) when
    /// the active tab is not class-backed.
    pub fn reload_active(&self) -> Option<String> {
        let active = self.active.as_deref()?;
        active.ends_with(".class").then(|| self.render_class(active))
    }

    fn render(&self, entry_path: &str) -> Result<String> {
        if entry_path.ends_with(".class") {
            return Ok(self.render_class(entry_path));
        }

        let archive = self.slot.archive().context("No archive loaded")?;
        let text = archive
            .read_text(entry_path)?
            .with_context(|| format!("No entry at {entry_path}"))?;
        Ok(truncate_text(text))
    }

    fn render_class(&self, entry_path: &str) -> String {
        let class_name = entry_path.strip_suffix(".class").unwrap_or(entry_path);
        match self.coordinator.decompile(class_name) {
            Ok(text) => text,
            Err(err) => render_error(&err),
        }
    }
}

fn render_error(err: &DecompileError) -> String {
    let mut content = format!("// Error: {err}");
    if matches!(err, DecompileError::Timeout { .. }) {
        content.push_str(TIMEOUT_TIP);
    }
    content
}

fn truncate_text(text: String) -> String {
    if text.chars().count() <= TEXT_TRUNCATE_LIMIT {
        return text;
    }
    let truncated: String = text.chars().take(TEXT_TRUNCATE_LIMIT).collect();
    format!("{truncated}\n... Truncated")
}
