//! Purpose: Generate the Turtle metadata an LV2 host needs to discover the plugins.
//! Exports: `write_bundle`, `manifest_ttl`, `plugin_ttl`, `default_binary_name`, `BundleSummary`.
//! Role: Backs the `bundle` command; keeps plugin URIs and port layout in one place.
//! Invariants: Every variant appears in both documents with its descriptor URI.
//! Invariants: Port indices match `PORT_SEQ_IN`/`PORT_SEQ_OUT` used by `connect_port`.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::instance::{PORT_SEQ_IN, PORT_SEQ_OUT};
use crate::core::variant::Variant;

pub const MANIFEST_FILE: &str = "manifest.ttl";
pub const PLUGIN_FILE: &str = "lv2-state-test.ttl";

const PREFIXES: &str = "\
@prefix atom:  <http://lv2plug.in/ns/ext/atom#> .
@prefix doap:  <http://usefulinc.com/ns/doap#> .
@prefix log:   <http://lv2plug.in/ns/ext/log#> .
@prefix lv2:   <http://lv2plug.in/ns/lv2core#> .
@prefix rdfs:  <http://www.w3.org/2000/01/rdf-schema#> .
@prefix state: <http://lv2plug.in/ns/ext/state#> .
@prefix urid:  <http://lv2plug.in/ns/ext/urid#> .
";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BundleSummary {
    pub dir: String,
    pub binary: String,
    pub files: Vec<String>,
    pub plugins: Vec<String>,
}

pub fn default_binary_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "liblv2_state_test.dylib"
    } else if cfg!(windows) {
        "lv2_state_test.dll"
    } else {
        "liblv2_state_test.so"
    }
}

pub fn manifest_ttl(binary: &str) -> String {
    let mut out = String::from(PREFIXES);
    for variant in Variant::ALL {
        let _ = write!(
            out,
            "\n<{uri}>\n    a lv2:Plugin ;\n    lv2:binary <{binary}> ;\n    rdfs:seeAlso <{PLUGIN_FILE}> .\n",
            uri = variant.uri(),
        );
    }
    out
}

pub fn plugin_ttl() -> String {
    let mut out = String::from(PREFIXES);
    for variant in Variant::ALL {
        let _ = write!(
            out,
            "
<{uri}>
    a lv2:Plugin, lv2:UtilityPlugin ;
    doap:name \"{label}\" ;
    lv2:requiredFeature urid:map ;
    lv2:optionalFeature log:log, state:makePath, state:freePath, state:mapPath ;
    lv2:extensionData state:interface ;
    lv2:port [
        a lv2:InputPort, atom:AtomPort ;
        atom:bufferType atom:Sequence ;
        lv2:index {seq_in} ;
        lv2:symbol \"events_in\" ;
        lv2:name \"Events Input\" ;
    ] , [
        a lv2:OutputPort, atom:AtomPort ;
        atom:bufferType atom:Sequence ;
        lv2:index {seq_out} ;
        lv2:symbol \"events_out\" ;
        lv2:name \"Events Output\" ;
    ] .
",
            uri = variant.uri(),
            label = variant.label(),
            seq_in = PORT_SEQ_IN,
            seq_out = PORT_SEQ_OUT,
        );
    }
    out
}

/// Writes `manifest.ttl` and the plugin description into `dir`, optionally
/// copying the shared library next to them.
pub fn write_bundle(
    dir: &Path,
    binary: &str,
    copy_binary: Option<&Path>,
) -> Result<BundleSummary, Error> {
    if binary.is_empty() || binary.contains('/') || binary.contains('\\') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("binary must be a bare file name inside the bundle"));
    }
    std::fs::create_dir_all(dir).map_err(|err| io_error("failed to create bundle dir", dir, err))?;

    let mut files = Vec::new();
    for (name, contents) in [(MANIFEST_FILE, manifest_ttl(binary)), (PLUGIN_FILE, plugin_ttl())] {
        let path = dir.join(name);
        std::fs::write(&path, contents).map_err(|err| io_error("failed to write", &path, err))?;
        files.push(path);
    }

    if let Some(source) = copy_binary {
        let target = dir.join(binary);
        std::fs::copy(source, &target)
            .map_err(|err| io_error("failed to copy plugin binary", source, err))?;
        files.push(target);
    }

    Ok(BundleSummary {
        dir: dir.to_string_lossy().into_owned(),
        binary: binary.to_string(),
        files: files.iter().map(|path| display(path)).collect(),
        plugins: Variant::ALL.iter().map(|variant| variant.uri()).collect(),
    })
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn io_error(message: &str, path: &Path, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}
