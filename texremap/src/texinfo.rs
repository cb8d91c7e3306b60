//! Plain text report of the textures a map uses, written next to the map
//! as `<map>_texinfo.txt`. Every line that is not a texture name is a `//`
//! comment, so a report section can be fed back as a materials file.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;
use compat_goldsrc::miptex::MipTex;
use compat_goldsrc::text::encode_cp1252;
use thiserror::Error;

use crate::config::GameMaterials;
use crate::material_set::MaterialSet;
use crate::names::base_key;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TexInfoParts: u32 {
        const EMBEDDED       = 0x0001;
        const EXTERNAL       = 0x0002;
        const GROUPED        = 0x0004;
        const UNIQUE_GROUPED = 0x0008;
        const HEADER         = 0x0400;
        const MATERIAL_NAMES = 0x0800;
        const MATERIAL_SET   = 0x1000;
    }
}

const PART_NAMES: [(&str, TexInfoParts); 9] = [
    ("embedded", TexInfoParts::EMBEDDED),
    ("external", TexInfoParts::EXTERNAL),
    ("all", TexInfoParts::EMBEDDED.union(TexInfoParts::EXTERNAL)),
    ("grouped", TexInfoParts::GROUPED),
    ("uniquegrouped", TexInfoParts::UNIQUE_GROUPED),
    ("header", TexInfoParts::HEADER),
    ("materialnames", TexInfoParts::MATERIAL_NAMES),
    ("materialset", TexInfoParts::MATERIAL_SET),
    ("none", TexInfoParts::empty()),
];

const LIST_SECTIONS: [(TexInfoParts, &str); 4] = [
    (TexInfoParts::EMBEDDED, "EMBEDDED"),
    (TexInfoParts::EXTERNAL, "EXTERNAL"),
    (TexInfoParts::GROUPED, "GROUPED"),
    (TexInfoParts::UNIQUE_GROUPED, "UNIQUEGROUPED"),
];

#[derive(Debug, Error)]
#[error("unknown texture info part {0:?}")]
pub struct UnknownPart(pub String);

impl FromStr for TexInfoParts {
    type Err = UnknownPart;

    /// Accepts names or numbers joined with `+`, `|` or spaces, e.g.
    /// `embedded+external` or `3`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = TexInfoParts::empty();
        for token in text.split(['+', '|', ' ']).filter(|token| !token.is_empty()) {
            if let Ok(bits) = token.parse::<u32>() {
                parts |= TexInfoParts::from_bits_truncate(bits);
                continue;
            }
            let (_, flag) = PART_NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(token))
                .ok_or_else(|| UnknownPart(token.to_string()))?;
            parts |= *flag;
        }
        Ok(parts)
    }
}

/// What a report is built from.
pub struct TexInfo<'a> {
    pub map_name: &'a str,
    pub textures: &'a [MipTex],
    pub materials: &'a Arc<GameMaterials>,
    /// Classified names; `UNIQUE_GROUPED` lists groups missing from it and
    /// `MATERIAL_SET` writes it out.
    pub material_set: Option<&'a MaterialSet>,
    pub wads: &'a [String],
}

impl TexInfo<'_> {
    fn embedded(&self) -> BTreeSet<String> {
        self.names(|texture| !texture.is_external())
    }

    fn external(&self) -> BTreeSet<String> {
        self.names(MipTex::is_external)
    }

    fn names(&self, keep: impl Fn(&MipTex) -> bool) -> BTreeSet<String> {
        self.textures
            .iter()
            .filter(|texture| keep(texture))
            .map(|texture| texture.name().to_string())
            .collect()
    }

    fn groups(&self) -> BTreeSet<String> {
        self.textures
            .iter()
            .map(|texture| base_key(texture.name()))
            .collect()
    }

    fn unique_groups(&self) -> BTreeSet<String> {
        let mut groups = self.groups();
        if let Some(set) = self.material_set {
            groups.retain(|group| !set.contains(group));
        }
        groups
    }
}

/// Writes the report encoded as cp1252, the encoding materials files are
/// read in.
pub fn write_texinfo<W: Write>(out: &mut W, parts: TexInfoParts, info: &TexInfo<'_>) -> io::Result<()> {
    let mut text = String::new();
    render_texinfo(&mut text, parts, info)
        .map_err(|_| io::Error::other("failed to format texture info"))?;
    out.write_all(&encode_cp1252(&text))
}

fn render_texinfo(out: &mut String, parts: TexInfoParts, info: &TexInfo<'_>) -> fmt::Result {
    if parts.contains(TexInfoParts::HEADER) {
        writeln!(out, "// Texture info for {}", info.map_name)?;
        writeln!(out, "// {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    }

    if parts.contains(TexInfoParts::MATERIAL_NAMES) {
        writeln!(out, "\n// Material types:")?;
        for letter in info.materials.alphabet() {
            let label = info.materials.label(*letter).unwrap_or("");
            writeln!(out, "//  {} - {}", letter, label)?;
        }
        writeln!(out, "// (this list may not be exhaustive, consult the mod's materials.txt)")?;
    }

    if let Some(set) = info.material_set.filter(|_| parts.contains(TexInfoParts::MATERIAL_SET)) {
        writeln!(out, "\n// Material entries:")?;
        if !info.wads.is_empty() {
            writeln!(out, "// wads: {}", info.wads.join(","))?;
        }
        out.push_str(&set.to_materials_text());
    }

    for (flag, title) in LIST_SECTIONS {
        if !parts.contains(flag) {
            continue;
        }
        let names = if flag == TexInfoParts::EMBEDDED {
            info.embedded()
        } else if flag == TexInfoParts::EXTERNAL {
            info.external()
        } else if flag == TexInfoParts::GROUPED {
            info.groups()
        } else {
            info.unique_groups()
        };
        log::info!("texture info {}: {} names", title, names.len());
        writeln!(out, "\n// {}:", title)?;
        for name in names {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}

/// Writes a report to `path`. A report with a header starts the file
/// over; anything else is appended.
pub fn dump_texinfo(path: &Path, parts: TexInfoParts, info: &TexInfo<'_>) -> io::Result<()> {
    if parts.is_empty() {
        return Ok(());
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!parts.contains(TexInfoParts::HEADER))
        .truncate(parts.contains(TexInfoParts::HEADER))
        .open(path)?;
    log::info!("writing texture info for {} to {}", info.map_name, path.display());
    let mut out = BufWriter::new(file);
    write_texinfo(&mut out, parts, info)?;
    out.flush()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::material_set::tests::valve;
    use compat_goldsrc::miptex::{Palette, PALETTE_LEN};
    use std::fs;

    pub(crate) fn test_texture(name: &str) -> MipTex {
        let palette = Palette::from_slice(&[0u8; PALETTE_LEN]).expect("palette");
        MipTex::new(name, 8, 8, vec![0; 64], palette).expect("texture")
    }

    fn textures() -> Vec<MipTex> {
        vec![
            test_texture("+0lava"),
            test_texture("+1lava"),
            test_texture("crate"),
            MipTex::external("sky_up", 64, 64).expect("external"),
        ]
    }

    #[test]
    fn parses_parts() {
        assert_eq!(
            "embedded+external".parse::<TexInfoParts>().expect("parts"),
            TexInfoParts::EMBEDDED | TexInfoParts::EXTERNAL
        );
        assert_eq!("All|grouped".parse::<TexInfoParts>().expect("parts").bits(), 7);
        assert_eq!("12".parse::<TexInfoParts>().expect("parts").bits(), 12);
        assert_eq!("".parse::<TexInfoParts>().expect("parts"), TexInfoParts::empty());
        assert!("bogus".parse::<TexInfoParts>().is_err());
    }

    #[test]
    fn writes_sections() {
        let textures = textures();
        let materials = valve();
        let mut set = MaterialSet::new(Arc::clone(&materials));
        set.insert('M', "LAVA").expect("insert");
        let info = TexInfo {
            map_name: "test.bsp",
            textures: &textures,
            materials: &materials,
            material_set: Some(&set),
            wads: &[],
        };
        let mut out = Vec::new();
        write_texinfo(
            &mut out,
            TexInfoParts::all() - TexInfoParts::MATERIAL_NAMES,
            &info,
        )
        .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("// Texture info for test.bsp\n"));
        assert!(text.contains("\n// EMBEDDED:\n+0lava\n+1lava\ncrate\n"));
        assert!(text.contains("\n// EXTERNAL:\nsky_up\n"));
        assert!(text.contains("\n// GROUPED:\nCRATE\nLAVA\nSKY_UP\n"));
        assert!(text.contains("\n// UNIQUEGROUPED:\nCRATE\nSKY_UP\n"));
        assert!(text.contains("M LAVA\n"));
        assert!(!text.contains("Material types"));
    }

    #[test]
    fn report_is_cp1252() {
        let textures = vec![test_texture("café"), test_texture("+0lava")];
        let materials = valve();
        let mut set = MaterialSet::new(Arc::clone(&materials));
        set.insert('M', "CAFÉ").expect("insert");
        let info = TexInfo {
            map_name: "test.bsp",
            textures: &textures,
            materials: &materials,
            material_set: Some(&set),
            wads: &[],
        };
        let mut out = Vec::new();
        write_texinfo(
            &mut out,
            TexInfoParts::EMBEDDED | TexInfoParts::MATERIAL_SET,
            &info,
        )
        .expect("write");
        assert!(out.windows(5).any(|window| window == b"caf\xe9\n"));
        assert!(String::from_utf8(out.clone()).is_err());

        let text = compat_goldsrc::text::decode_cp1252(&out);
        let reread = MaterialSet::parse_materials(&text, Arc::clone(&materials));
        assert_eq!(reread.letter_of("CAFÉ"), Some('M'));
    }

    #[test]
    fn header_truncates_and_other_parts_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test_texinfo.txt");
        fs::write(&path, "stale\n").expect("write");
        let textures = textures();
        let materials = valve();
        let info = TexInfo {
            map_name: "test.bsp",
            textures: &textures,
            materials: &materials,
            material_set: None,
            wads: &[],
        };
        dump_texinfo(&path, TexInfoParts::HEADER | TexInfoParts::MATERIAL_NAMES, &info)
            .expect("dump");
        dump_texinfo(&path, TexInfoParts::EXTERNAL, &info).expect("dump");
        let text = fs::read_to_string(&path).expect("read");
        assert!(!text.contains("stale"));
        assert!(text.contains("//  Y - Glass\n"));
        assert!(text.ends_with("// EXTERNAL:\nsky_up\n"));
    }
}
