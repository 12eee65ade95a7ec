//! Purpose: Describe the four progressively-simplified probe plugins.
//! Exports: `Variant`, `FULL_URI`, `URI_PREFIX`.
//! Role: Single table of per-variant behavior consulted by instances, descriptors and bundles.
//! Invariants: Descriptor index order is stable: full, paths, save-only, flags-only.
//! Invariants: Each simpler variant only removes behavior from the previous one.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

/// Published URI of the full variant; sessions saved against it map `#number` here.
pub const FULL_URI: &str = "https://git.kx.studio/falkTX/lv2-state-test";
pub const URI_PREFIX: &str = "urn:lv2-state-test:";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Probes on init and save, writes the sentinel, persists and reads it back.
    Full,
    /// Probes paths without writing files; persists the sentinel.
    Paths,
    /// Probes only when saving; persists nothing.
    SaveOnly,
    /// Only tracks lifecycle flags.
    FlagsOnly,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Full,
        Variant::Paths,
        Variant::SaveOnly,
        Variant::FlagsOnly,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        match self {
            Variant::Full => 0,
            Variant::Paths => 1,
            Variant::SaveOnly => 2,
            Variant::FlagsOnly => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Full => "full",
            Variant::Paths => "paths",
            Variant::SaveOnly => "save-only",
            Variant::FlagsOnly => "flags-only",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Variant::Full => "State Test",
            Variant::Paths => "State Test (paths only)",
            Variant::SaveOnly => "State Test (save only)",
            Variant::FlagsOnly => "State Test (flags only)",
        }
    }

    pub fn uri(self) -> String {
        match self {
            Variant::Full => FULL_URI.to_string(),
            _ => format!("{URI_PREFIX}{}", self.name()),
        }
    }

    /// URI of the property the sentinel is persisted under.
    pub fn number_uri(self) -> String {
        format!("{}#number", self.uri())
    }

    pub fn probes_on_init(self) -> bool {
        matches!(self, Variant::Full | Variant::Paths)
    }

    pub fn probes_on_save(self) -> bool {
        !matches!(self, Variant::FlagsOnly)
    }

    pub fn writes_sentinel(self) -> bool {
        matches!(self, Variant::Full)
    }

    pub fn persists_number(self) -> bool {
        matches!(self, Variant::Full | Variant::Paths)
    }

    pub fn reads_back_number(self) -> bool {
        matches!(self, Variant::Full)
    }

    pub fn queries_path_on_restore(self) -> bool {
        !matches!(self, Variant::FlagsOnly)
    }

    pub fn restore_requires_make_path(self) -> bool {
        matches!(self, Variant::Full)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.name() == input)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage).with_message(format!(
                    "unknown variant '{input}' (expected full, paths, save-only or flags-only)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{URI_PREFIX, Variant};

    #[test]
    fn descriptor_indices_are_stable() {
        for (index, variant) in Variant::ALL.iter().enumerate() {
            assert_eq!(variant.index() as usize, index);
            assert_eq!(Variant::from_index(index as u32), Some(*variant));
        }
        assert_eq!(Variant::from_index(4), None);
    }

    #[test]
    fn simpler_variants_never_gain_behavior() {
        let traits = |v: Variant| {
            [
                v.probes_on_init(),
                v.probes_on_save(),
                v.writes_sentinel(),
                v.persists_number(),
                v.queries_path_on_restore(),
            ]
        };
        for pair in Variant::ALL.windows(2) {
            let richer = traits(pair[0]);
            let simpler = traits(pair[1]);
            for (r, s) in richer.iter().zip(simpler.iter()) {
                assert!(*r || !*s, "{} gained behavior over {}", pair[1], pair[0]);
            }
        }
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for variant in Variant::ALL {
            assert_eq!(variant.name().parse::<Variant>().expect("parse"), variant);
        }
        assert_eq!(
            Variant::Full.number_uri(),
            "https://git.kx.studio/falkTX/lv2-state-test#number"
        );
        for variant in [Variant::Paths, Variant::SaveOnly, Variant::FlagsOnly] {
            assert!(variant.uri().starts_with(URI_PREFIX));
        }
        assert!("bogus".parse::<Variant>().is_err());
    }
}
