use anyhow::Result;
use jarview::coordinator::{Coordinator, DecompileError};
use jarview::engine::{ClassSource, DecompileEngine, SkeletonEngine};
use jarview::resolve::ArchiveSlot;
use jarview::session::Session;
use jarview::worker::WorkerConfig;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn temp_jar_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "jarview_it_{}_{}_{}.jar",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    use zip::write::FileOptions;

    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

/// Assembles a minimal valid class file: constant pool with this/super class
/// plus extra referenced classes, public access, no members.
fn class_bytes(this_class: &str, super_class: &str, referenced: &[&str]) -> Vec<u8> {
    let mut pool: Vec<Vec<u8>> = Vec::new();
    let mut add_utf8 = |pool: &mut Vec<Vec<u8>>, value: &str| -> u16 {
        let mut entry = vec![1u8];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        pool.push(entry);
        pool.len() as u16
    };
    let mut add_class = |pool: &mut Vec<Vec<u8>>, name: &str| -> u16 {
        let name_index = add_utf8(pool, name);
        let mut entry = vec![7u8];
        entry.extend_from_slice(&name_index.to_be_bytes());
        pool.push(entry);
        pool.len() as u16
    };

    let this_index = add_class(&mut pool, this_class);
    let super_index = add_class(&mut pool, super_class);
    for name in referenced {
        add_class(&mut pool, name);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&52u16.to_be_bytes());
    out.extend_from_slice(&((pool.len() as u16 + 1).to_be_bytes()));
    for entry in &pool {
        out.extend_from_slice(entry);
    }
    out.extend_from_slice(&0x0021u16.to_be_bytes()); // public super
    out.extend_from_slice(&this_index.to_be_bytes());
    out.extend_from_slice(&super_index.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
    out.extend_from_slice(&0u16.to_be_bytes()); // fields
    out.extend_from_slice(&0u16.to_be_bytes()); // methods
    out.extend_from_slice(&0u16.to_be_bytes()); // attributes
    out
}

#[test]
fn dependency_resolution_flows_through_the_archive() -> Result<()> {
    let jar = temp_jar_path("dependency_flow");
    let b = class_bytes("a/B", "java/lang/Object", &[]);
    // a/C references a/B (in-archive) and a/D (absent).
    let c = class_bytes("a/C", "java/lang/Object", &["a/B", "a/D"]);
    write_jar(&jar, &[("a/B.class", &b), ("a/C.class", &c)])?;

    let mut session = Session::new(Arc::new(SkeletonEngine::new()));
    session.load_archive(&jar)?;

    let text = session.open("a/C.class")?;
    assert!(!text.is_empty());
    assert!(text.contains("package a;"));
    assert!(text.contains("public class C {"));
    // The absent dependency resolved to "not found" without failing the
    // request.
    assert!(!text.starts_with("// Error:"));

    let _ = std::fs::remove_file(&jar);
    Ok(())
}

#[test]
fn decompile_resolves_against_the_reloaded_archive() -> Result<()> {
    let old_jar = temp_jar_path("reload_old");
    let new_jar = temp_jar_path("reload_new");
    write_jar(
        &old_jar,
        &[("a/C.class", &class_bytes("a/C", "a/OldBase", &[]))],
    )?;
    write_jar(
        &new_jar,
        &[("a/C.class", &class_bytes("a/C", "a/NewBase", &[]))],
    )?;

    let mut session = Session::new(Arc::new(SkeletonEngine::new()));
    session.load_archive(&old_jar)?;
    assert!(session.open("a/C.class")?.contains("extends a.OldBase"));

    session.load_archive(&new_jar)?;
    assert!(session.open("a/C.class")?.contains("extends a.NewBase"));

    let _ = std::fs::remove_file(&old_jar);
    let _ = std::fs::remove_file(&new_jar);
    Ok(())
}

/// Sleeps per-class (latency encoded in the class name as `pkg/C<ms>`), then
/// echoes a payload derived from the name.
struct LatencyEngine;

impl DecompileEngine for LatencyEngine {
    fn decompile(
        &self,
        class_name: &str,
        _options: &BTreeMap<String, String>,
        _source: &dyn ClassSource,
    ) -> Result<String> {
        let millis: u64 = class_name
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0);
        std::thread::sleep(Duration::from_millis(millis));
        Ok(format!("payload for {class_name}"))
    }
}

#[test]
fn concurrent_requests_with_shuffled_latencies_never_cross_deliver() {
    let coordinator = Coordinator::with_config(
        Arc::new(LatencyEngine),
        ArchiveSlot::new(),
        WorkerConfig { max_concurrent: 6 },
    );

    // Later requests finish earlier; correlation must hold regardless of
    // arrival order.
    let latencies = [90u64, 75, 60, 45, 30, 15, 5, 0];
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for (i, millis) in latencies.iter().enumerate() {
            let coordinator = &coordinator;
            handles.push(scope.spawn(move || {
                let name = format!("pkg{i}/C{millis}");
                let text = coordinator.decompile(&name).unwrap();
                assert_eq!(text, format!("payload for {name}"));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    });

    assert_eq!(coordinator.in_flight(), 0);
}

struct NeverEngine;

impl DecompileEngine for NeverEngine {
    fn decompile(
        &self,
        _class_name: &str,
        _options: &BTreeMap<String, String>,
        _source: &dyn ClassSource,
    ) -> Result<String> {
        std::thread::sleep(Duration::from_secs(2));
        Ok("too late".to_string())
    }
}

#[test]
fn one_millisecond_timeout_rejects_within_a_bounded_margin() {
    let coordinator = Coordinator::new(Arc::new(NeverEngine), ArchiveSlot::new());
    let mut overrides = BTreeMap::new();
    overrides.insert("decompiletimeout".to_string(), "1".to_string());
    coordinator.set_options(&overrides);

    let start = Instant::now();
    let err = coordinator.decompile("a/C").unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, DecompileError::Timeout { elapsed_ms: 1 }));
    assert!(err.to_string().contains("1ms"));
    assert!(elapsed < Duration::from_millis(500), "elapsed: {elapsed:?}");
    assert_eq!(coordinator.in_flight(), 0);
}

#[test]
fn option_overrides_flow_into_the_rendered_output() -> Result<()> {
    let jar = temp_jar_path("option_flow");
    write_jar(
        &jar,
        &[("a/B.class", &class_bytes("a/B", "java/lang/Object", &[]))],
    )?;

    let mut session = Session::new(Arc::new(SkeletonEngine::new()));
    session.load_archive(&jar)?;

    let with_header = session.open("a/B.class")?;
    assert!(with_header.contains("Decompiled with jarview"));

    let mut overrides = BTreeMap::new();
    overrides.insert("showversion".to_string(), "false".to_string());
    let without_header = session
        .update_options(&overrides)
        .expect("active tab is class-backed");
    assert!(!without_header.contains("Decompiled with jarview"));

    let _ = std::fs::remove_file(&jar);
    Ok(())
}
