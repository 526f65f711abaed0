//! Decompile capability seam and the bundled skeleton engine.
//!
//! The execution unit treats decompilation as an opaque capability behind
//! `DecompileEngine`. The bundled `SkeletonEngine` is not a real decompiler:
//! it renders a structural skeleton (header, package, declaration, member
//! signatures) from the class file, requesting dependency bytecode through
//! `ClassSource` the same way a real engine would.

use crate::classfile::{
    self, ClassFile, access, binary_name, class_keyword, class_modifiers, member_modifiers,
    pretty_field_descriptor, pretty_method_descriptor,
};
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, BTreeSet};

/// Supplies bytecode by symbolic name. `load` may block indefinitely; the
/// coordinator's request timeout bounds total latency.
pub trait ClassSource {
    fn load(&self, raw_path: &str) -> Option<Vec<u8>>;
}

pub trait DecompileEngine: Send + Sync {
    fn decompile(
        &self,
        class_name: &str,
        options: &BTreeMap<String, String>,
        source: &dyn ClassSource,
    ) -> Result<String>;
}

#[derive(Debug, Default)]
pub struct SkeletonEngine;

impl SkeletonEngine {
    pub fn new() -> Self {
        Self
    }
}

fn option_enabled(options: &BTreeMap<String, String>, key: &str) -> bool {
    // Trooleans: "neither" behaves like the engine default, i.e. enabled.
    options.get(key).map(String::as_str) != Some("false")
}

impl DecompileEngine for SkeletonEngine {
    fn decompile(
        &self,
        class_name: &str,
        options: &BTreeMap<String, String>,
        source: &dyn ClassSource,
    ) -> Result<String> {
        let bytes = source
            .load(class_name)
            .with_context(|| format!("Class not found in archive: {class_name}"))?;
        let class = classfile::parse(&bytes)
            .with_context(|| format!("Failed to parse class file: {class_name}"))?;

        // One resolution per distinct referenced class. Platform classes
        // (java/*) are never archive entries and are not requested.
        let mut resolved: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for referenced in &class.referenced_classes {
            if referenced.starts_with("java/") {
                continue;
            }
            if let Some(dep_bytes) = source.load(referenced) {
                resolved.insert(referenced.clone(), dep_bytes);
            }
        }

        let mut out = String::new();
        if option_enabled(options, "showversion") {
            out.push_str(&format!(
                "/*\n * Decompiled with jarview {}.\n */\n",
                env!("CARGO_PKG_VERSION")
            ));
        }

        let package = package_of(&class.this_class);
        if !package.is_empty() {
            out.push_str(&format!("package {package};\n\n"));
        }

        let shortener = Shortener::new(&package, resolved.keys());
        for import in shortener.imports() {
            out.push_str(&format!("import {import};\n"));
        }
        if !shortener.imports().is_empty() {
            out.push('\n');
        }

        render_class(&mut out, &class, &shortener, options, 0);

        if option_enabled(options, "innerclasses") {
            let inner_prefix = format!("{}$", class.this_class);
            for (name, dep_bytes) in &resolved {
                if !name.starts_with(&inner_prefix) {
                    continue;
                }
                let Ok(inner) = classfile::parse(dep_bytes) else {
                    continue;
                };
                out.push('\n');
                render_class(&mut out, &inner, &shortener, options, 0);
            }
        }

        if out.is_empty() {
            bail!("Empty output for {class_name}");
        }
        Ok(out)
    }
}

fn package_of(internal_name: &str) -> String {
    match internal_name.rfind('/') {
        Some(pos) => binary_name(&internal_name[..pos]),
        None => String::new(),
    }
}

fn simple_name(internal_name: &str) -> &str {
    let after_slash = internal_name.rsplit('/').next().unwrap_or(internal_name);
    after_slash.rsplit('$').next().unwrap_or(after_slash)
}

/// Decides how type names render: classes resolved from the archive get short
/// names (with an import when they live in another package), `java.lang` is
/// short without an import, everything else stays fully qualified.
struct Shortener {
    imports: Vec<String>,
    short: BTreeSet<String>,
}

impl Shortener {
    fn new<'a>(package: &str, resolved: impl Iterator<Item = &'a String>) -> Self {
        let mut imports = Vec::new();
        let mut short = BTreeSet::new();
        for internal in resolved {
            let dotted = binary_name(internal);
            short.insert(dotted.clone());
            if package_of(internal) != package && !internal.contains('$') {
                imports.push(dotted);
            }
        }
        imports.sort();
        imports.dedup();
        Self { imports, short }
    }

    fn imports(&self) -> &[String] {
        &self.imports
    }

    fn display(&self, dotted: &str) -> String {
        if let Some(base) = dotted.strip_suffix("[]") {
            return format!("{}[]", self.display(base));
        }

        let package = match dotted.rfind('.') {
            Some(pos) => &dotted[..pos],
            None => "",
        };
        let shortable = self.short.contains(dotted) || package == "java.lang";
        if shortable {
            dotted.rsplit('.').next().unwrap_or(dotted).to_string()
        } else {
            dotted.to_string()
        }
    }
}

fn render_class(
    out: &mut String,
    class: &ClassFile,
    shortener: &Shortener,
    options: &BTreeMap<String, String>,
    indent: usize,
) {
    let pad = "    ".repeat(indent);
    let name = simple_name(&class.this_class);
    let keyword = class_keyword(class.access_flags);

    let mut decl = String::new();
    let modifiers = class_modifiers(class.access_flags);
    if !modifiers.is_empty() {
        decl.push_str(&modifiers);
        decl.push(' ');
    }
    decl.push_str(keyword);
    decl.push(' ');
    decl.push_str(name);

    if class.access_flags & access::INTERFACE == 0 {
        if let Some(super_class) = class.super_class.as_deref() {
            if super_class != "java/lang/Object" && super_class != "java/lang/Enum" {
                decl.push_str(" extends ");
                decl.push_str(&shortener.display(&binary_name(super_class)));
            }
        }
    }
    if !class.interfaces.is_empty() {
        let joined: Vec<String> = class
            .interfaces
            .iter()
            .map(|i| shortener.display(&binary_name(i)))
            .collect();
        let relation = if class.access_flags & access::INTERFACE != 0 {
            "extends"
        } else {
            "implements"
        };
        decl.push_str(&format!(" {relation} {}", joined.join(", ")));
    }

    out.push_str(&format!("{pad}{decl} {{\n"));

    let hide_boilerplate = option_enabled(options, "removeboilerplate");
    let member_pad = "    ".repeat(indent + 1);

    for field in &class.fields {
        if hide_boilerplate && field.access_flags & access::SYNTHETIC != 0 {
            continue;
        }
        let mut line = String::new();
        let modifiers = member_modifiers(field.access_flags);
        if !modifiers.is_empty() {
            line.push_str(&modifiers);
            line.push(' ');
        }
        let ty = shortener.display(&pretty_field_descriptor(&field.descriptor));
        out.push_str(&format!("{member_pad}{line}{ty} {};\n", field.name));
    }
    if !class.fields.is_empty() && !class.methods.is_empty() {
        out.push('\n');
    }

    let mut first_method = true;
    for method in &class.methods {
        if method.name == "<clinit>" {
            continue;
        }
        if hide_boilerplate && method.access_flags & access::SYNTHETIC != 0 {
            continue;
        }
        if !first_method {
            out.push('\n');
        }
        first_method = false;

        let (params, ret) = pretty_method_descriptor(&method.descriptor);
        let params: Vec<String> = params.iter().map(|p| shortener.display(p)).collect();

        let mut line = String::new();
        let modifiers = member_modifiers(method.access_flags);
        if !modifiers.is_empty() {
            line.push_str(&modifiers);
            line.push(' ');
        }
        if method.name == "<init>" {
            line.push_str(&format!("{name}({})", params.join(", ")));
        } else {
            line.push_str(&format!(
                "{} {}({})",
                shortener.display(&ret),
                method.name,
                params.join(", ")
            ));
        }

        let abstract_like = method.access_flags & (access::ABSTRACT | access::NATIVE) != 0
            || class.access_flags & access::INTERFACE != 0;
        if abstract_like {
            out.push_str(&format!("{member_pad}{line};\n"));
        } else {
            out.push_str(&format!("{member_pad}{line} {{\n{member_pad}}}\n"));
        }
    }

    out.push_str(&format!("{pad}}}\n"));
}
