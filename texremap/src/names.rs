//! Texture name anatomy.
//!
//! The engine reads meaning out of the first characters of a texture name:
//! `+0`..`+9`/`+A`..`+J` animation frames, `-0`..`-9` random tiling groups,
//! then `{` (alpha-tested), `!` (water), `~` (emissive) or a space. What is
//! left is the base name looked up in `materials.txt`.

use std::sync::OnceLock;

use regex::Regex;

/// Characters a texture name can hold.
pub const NAME_CAPACITY: usize = 15;
/// Shortest materials entry that is worth borrowing: the engine compares
/// only the first 12 characters of a name against `materials.txt`.
pub const MIN_USABLE_LEN: usize = 12;
/// Candidate offered for the default material when nothing else fits.
pub const FALLBACK_NAME: &str = "__NOMATERIAL";
pub const DEFAULT_PAD_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// A prefix longer than this is not something the engine strips.
pub const MAX_PREFIX_LEN: usize = 2;

const RESERVED_NAMES: [&str; 12] = [
    "AAATRIGGER",
    "BEVEL",
    "BLACK_HIDDEN",
    "CLIP",
    "CLIPBEVEL",
    "CONTENTWATER",
    "HINT",
    "NODRAW",
    "NULL",
    "ORIGIN",
    "SKIP",
    "SKY",
];
const RESERVED_PREFIXES: [&str; 2] = ["SCROLL", "{BLUE"];

const METADATA_KEYS: [&str; 8] = [
    "classname",
    "origin",
    "angle",
    "angles",
    "target",
    "targetname",
    "spawnflags",
    "materials_path",
];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?s)(?P<prefix>(?:[+-].)?[{!~ ]?)(?P<base>.*)$")
            .expect("texture name pattern is valid")
    })
}

/// A texture name split into its engine prefix and base name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureName<'a> {
    pub prefix: &'a str,
    pub base: &'a str,
}

impl<'a> TextureName<'a> {
    pub fn parse(name: &'a str) -> Self {
        match name_pattern().captures(name) {
            Some(caps) => {
                let prefix_len = caps.name("prefix").map(|m| m.end()).unwrap_or(0);
                Self {
                    prefix: &name[..prefix_len],
                    base: &name[prefix_len..],
                }
            }
            None => Self {
                prefix: "",
                base: name,
            },
        }
    }

    /// Frames of an animation or tiles of a random group share one base.
    pub fn is_grouped(&self) -> bool {
        self.prefix.starts_with(['+', '-'])
    }

    pub fn base_key(&self) -> String {
        self.base.to_ascii_uppercase()
    }
}

/// Uppercased base name, the key material sets are indexed by.
pub fn base_key(name: &str) -> String {
    TextureName::parse(name).base_key()
}

/// Tool and special textures that must keep their names.
pub fn is_reserved(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let base = base_key(name);
    [upper.as_str(), base.as_str()].iter().any(|candidate| {
        RESERVED_NAMES.contains(candidate)
            || RESERVED_PREFIXES
                .iter()
                .any(|prefix| candidate.starts_with(prefix))
    })
}

/// Entity keys that never name a texture.
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with('_') || METADATA_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prefixes() {
        let cases = [
            ("+0metalwall01", "+0", "metalwall01"),
            ("-2crete", "-2", "crete"),
            ("{fence", "{", "fence"),
            ("!water", "!", "water"),
            ("~light", "~", "light"),
            ("+A~lamp", "+A~", "lamp"),
            ("plainwall", "", "plainwall"),
            ("+", "", "+"),
        ];
        for (name, prefix, base) in cases {
            let parsed = TextureName::parse(name);
            assert_eq!((parsed.prefix, parsed.base), (prefix, base), "{name}");
        }
    }

    #[test]
    fn grouping() {
        assert!(TextureName::parse("+1lava").is_grouped());
        assert!(TextureName::parse("-0tile").is_grouped());
        assert!(!TextureName::parse("{grate").is_grouped());
        assert!(!TextureName::parse("wall").is_grouped());
    }

    #[test]
    fn base_key_is_uppercase() {
        assert_eq!(base_key("+0metalwall01"), "METALWALL01");
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved("sky"));
        assert!(is_reserved("AAATRIGGER"));
        assert!(is_reserved("scrollwater"));
        assert!(is_reserved("{BLUE"));
        assert!(is_reserved("!ORIGIN"));
        assert!(!is_reserved("skybox_wall"));
        assert!(is_reserved("{blue_glass"));
        assert!(!is_reserved("blueprint"));
    }

    #[test]
    fn metadata_keys() {
        assert!(is_metadata_key("classname"));
        assert!(is_metadata_key("_minlight"));
        assert!(is_metadata_key("materials_path"));
        assert!(!is_metadata_key("METALWALL01"));
    }
}
