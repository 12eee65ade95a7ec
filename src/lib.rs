//! Purpose: Diagnostic LV2 plugins that report how a host handles state path services.
//! Exports: `abi` (the `lv2_descriptor` entry point), `core` (plugin record, probes, errors),
//!          `host` (in-process host), `bundle` (Turtle metadata).
//! Role: Built as a `cdylib` for hosts and as an `rlib` for the CLI and tests.
//! Invariants: All host interaction crosses `abi`; `core` never sees raw callback tables.
//! Invariants: Plugin failures are logged and swallowed except a missing urid:map.
pub mod abi;
pub mod bundle;
pub mod core;
pub mod host;
