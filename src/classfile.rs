//! Minimal Java class file reader.
//!
//! Parses just enough of the class file format to drive skeleton rendering:
//! constant pool, access flags, class hierarchy, field and method signatures,
//! and the set of classes referenced from the constant pool. Attribute
//! payloads and bytecode are skipped.

use anyhow::{Context, Result, bail};

const MAGIC: u32 = 0xCAFE_BABE;

pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
}

#[derive(Debug, Clone)]
pub struct Member {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal form, e.g. `com/foo/Bar`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    /// Distinct classes referenced from the constant pool, in pool order,
    /// excluding the class itself and array descriptors.
    pub referenced_classes: Vec<String>,
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class(u16),
    Other,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .with_context(|| format!("Truncated class file at offset {}", self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
    let mut r = Reader::new(bytes);

    let magic = r.u4()?;
    if magic != MAGIC {
        bail!("Not a class file (bad magic: 0x{magic:08X})");
    }
    let minor_version = r.u2()?;
    let major_version = r.u2()?;

    let pool = parse_constant_pool(&mut r)?;

    let access_flags = r.u2()?;
    let this_class_index = r.u2()?;
    let super_class_index = r.u2()?;

    let this_class = class_name(&pool, this_class_index)
        .context("Invalid this_class constant pool reference")?;
    let super_class = if super_class_index == 0 {
        None
    } else {
        Some(
            class_name(&pool, super_class_index)
                .context("Invalid super_class constant pool reference")?,
        )
    };

    let interface_count = r.u2()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = r.u2()?;
        interfaces.push(class_name(&pool, index).context("Invalid interface reference")?);
    }

    let fields = parse_members(&mut r, &pool)?;
    let methods = parse_members(&mut r, &pool)?;
    // Class-level attributes are skipped entirely.

    let mut referenced_classes = Vec::new();
    for (index, constant) in pool.iter().enumerate() {
        if let Constant::Class(_) = constant {
            let name = class_name(&pool, index as u16)
                .context("Dangling class constant in pool")?;
            if name == this_class || name.starts_with('[') {
                continue;
            }
            if !referenced_classes.contains(&name) {
                referenced_classes.push(name);
            }
        }
    }

    Ok(ClassFile {
        minor_version,
        major_version,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        referenced_classes,
    })
}

fn parse_constant_pool(r: &mut Reader<'_>) -> Result<Vec<Constant>> {
    let count = r.u2()?;
    if count == 0 {
        bail!("Constant pool count must be at least 1");
    }

    // Slot 0 is unused; Long/Double occupy two slots.
    let mut pool = vec![Constant::Other; count as usize];
    let mut index = 1usize;
    while index < count as usize {
        let tag = r.u1()?;
        let mut double_width = false;
        pool[index] = match tag {
            1 => {
                let len = r.u2()? as usize;
                let raw = r.take(len)?;
                Constant::Utf8(String::from_utf8_lossy(raw).to_string())
            }
            7 => Constant::Class(r.u2()?),
            3 | 4 => {
                r.take(4)?;
                Constant::Other
            }
            5 | 6 => {
                r.take(8)?;
                double_width = true;
                Constant::Other
            }
            8 | 16 | 19 | 20 => {
                r.take(2)?;
                Constant::Other
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                r.take(4)?;
                Constant::Other
            }
            15 => {
                r.take(3)?;
                Constant::Other
            }
            other => bail!("Unsupported constant pool tag {other} at index {index}"),
        };
        index += if double_width { 2 } else { 1 };
    }

    Ok(pool)
}

fn parse_members(r: &mut Reader<'_>, pool: &[Constant]) -> Result<Vec<Member>> {
    let count = r.u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = r.u2()?;
        let name_index = r.u2()?;
        let descriptor_index = r.u2()?;

        let name = utf8(pool, name_index).context("Invalid member name reference")?;
        let descriptor =
            utf8(pool, descriptor_index).context("Invalid member descriptor reference")?;

        let attribute_count = r.u2()?;
        for _ in 0..attribute_count {
            let _name_index = r.u2()?;
            let length = r.u4()? as usize;
            r.take(length)?;
        }

        members.push(Member {
            access_flags,
            name,
            descriptor,
        });
    }
    Ok(members)
}

fn utf8(pool: &[Constant], index: u16) -> Option<String> {
    match pool.get(index as usize)? {
        Constant::Utf8(s) => Some(s.clone()),
        _ => None,
    }
}

fn class_name(pool: &[Constant], index: u16) -> Option<String> {
    match pool.get(index as usize)? {
        Constant::Class(name_index) => utf8(pool, *name_index),
        _ => None,
    }
}

/// `com/foo/Bar` -> `com.foo.Bar`.
pub fn binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

pub fn class_modifiers(flags: u16) -> String {
    let mut parts = Vec::new();
    if flags & access::PUBLIC != 0 {
        parts.push("public");
    }
    if flags & access::FINAL != 0 && flags & access::ENUM == 0 {
        parts.push("final");
    }
    if flags & access::ABSTRACT != 0 && flags & access::INTERFACE == 0 {
        parts.push("abstract");
    }
    parts.join(" ")
}

pub fn class_keyword(flags: u16) -> &'static str {
    if flags & access::ANNOTATION != 0 {
        "@interface"
    } else if flags & access::INTERFACE != 0 {
        "interface"
    } else if flags & access::ENUM != 0 {
        "enum"
    } else {
        "class"
    }
}

pub fn member_modifiers(flags: u16) -> String {
    let mut parts = Vec::new();
    if flags & access::PUBLIC != 0 {
        parts.push("public");
    }
    if flags & access::PROTECTED != 0 {
        parts.push("protected");
    }
    if flags & access::PRIVATE != 0 {
        parts.push("private");
    }
    if flags & access::STATIC != 0 {
        parts.push("static");
    }
    if flags & access::FINAL != 0 {
        parts.push("final");
    }
    if flags & access::VOLATILE != 0 {
        parts.push("volatile");
    }
    if flags & access::TRANSIENT != 0 {
        parts.push("transient");
    }
    if flags & access::NATIVE != 0 {
        parts.push("native");
    }
    if flags & access::ABSTRACT != 0 {
        parts.push("abstract");
    }
    parts.join(" ")
}

/// Pretty-prints a field descriptor, e.g. `[Ljava/lang/String;` -> `java.lang.String[]`.
pub fn pretty_field_descriptor(descriptor: &str) -> String {
    let (ty, rest) = parse_type(descriptor);
    if rest.is_empty() { ty } else { descriptor.to_string() }
}

/// Pretty-prints a method descriptor into `(params, return type)`.
pub fn pretty_method_descriptor(descriptor: &str) -> (Vec<String>, String) {
    let Some(rest) = descriptor.strip_prefix('(') else {
        return (Vec::new(), descriptor.to_string());
    };
    let Some(close) = rest.find(')') else {
        return (Vec::new(), descriptor.to_string());
    };

    let mut params = Vec::new();
    let mut remaining = &rest[..close];
    while !remaining.is_empty() {
        let (ty, next) = parse_type(remaining);
        if next.len() == remaining.len() {
            // No progress; malformed descriptor, show it raw.
            return (Vec::new(), descriptor.to_string());
        }
        params.push(ty);
        remaining = next;
    }

    let (ret, _) = parse_type(&rest[close + 1..]);
    (params, ret)
}

fn parse_type(descriptor: &str) -> (String, &str) {
    let mut chars = descriptor.char_indices();
    let Some((_, first)) = chars.next() else {
        return (String::new(), descriptor);
    };

    match first {
        'B' => ("byte".to_string(), &descriptor[1..]),
        'C' => ("char".to_string(), &descriptor[1..]),
        'D' => ("double".to_string(), &descriptor[1..]),
        'F' => ("float".to_string(), &descriptor[1..]),
        'I' => ("int".to_string(), &descriptor[1..]),
        'J' => ("long".to_string(), &descriptor[1..]),
        'S' => ("short".to_string(), &descriptor[1..]),
        'Z' => ("boolean".to_string(), &descriptor[1..]),
        'V' => ("void".to_string(), &descriptor[1..]),
        'L' => match descriptor.find(';') {
            Some(end) => (binary_name(&descriptor[1..end]), &descriptor[end + 1..]),
            None => (descriptor.to_string(), ""),
        },
        '[' => {
            let (inner, rest) = parse_type(&descriptor[1..]);
            if inner.is_empty() {
                (descriptor.to_string(), "")
            } else {
                (format!("{inner}[]"), rest)
            }
        }
        _ => (descriptor.to_string(), ""),
    }
}
