//! # jarview
//!
//! Browse jar/zip/war archives and view decompiled class skeletons.
//!
//! ## Architecture
//!
//! - **archive**: Archive store over memory-mapped zip containers
//! - **resolve**: Symbolic-name normalization and the resolution bridge
//! - **options**: Decompiler options catalogue and per-coordinator map
//! - **classfile**: Minimal Java class file reader
//! - **engine**: Decompile capability seam and the bundled skeleton engine
//! - **worker**: Isolated execution unit performing decompilation
//! - **coordinator**: Request lifecycle, timeout racing, result correlation
//! - **session**: Tab/content consumer feeding the coordinator
//! - **cli**: Command-line surface over the session

pub mod archive;
pub mod classfile;
pub mod cli;
pub mod coordinator;
pub mod engine;
pub mod options;
pub mod resolve;
pub mod session;
pub mod worker;
