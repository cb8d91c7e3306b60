//! Material remapping for GoldSrc maps.
//!
//! Embedded textures are renamed so their names begin with an entry of the
//! mod's `materials.txt`, which gives them that entry's footstep and impact
//! sounds without shipping a new materials file.
#![forbid(unsafe_code)]

pub mod config;
pub mod locate;
pub mod material_set;
pub mod names;
pub mod remapper;
pub mod sources;
pub mod texinfo;

use compat_goldsrc::miptex::MipTex;

pub use config::{ConfigError, GameMaterials, MaterialConfig};
pub use material_set::{MaterialError, MaterialSet};
pub use remapper::TextureRemapper;
pub use texinfo::TexInfoParts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapReport {
    pub renamed: usize,
    pub unchanged: usize,
}

/// Renames the embedded textures in `textures`. External textures keep
/// their names, since the WAD they come from is not touched.
pub fn apply_remap(remapper: &mut TextureRemapper, textures: &mut [MipTex]) -> RemapReport {
    let mut report = RemapReport::default();
    for texture in textures.iter_mut().filter(|texture| !texture.is_external()) {
        let old = texture.name().to_string();
        let new = remapper.remap(&old);
        if new.eq_ignore_ascii_case(&old) {
            log::info!("{:15} --> (unchanged)", old);
            report.unchanged += 1;
        } else {
            log::info!("{:15} --> {}", old, new);
            texture.set_name(&new);
            report.renamed += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material_set::tests::valve;
    use crate::texinfo::tests::test_texture;

    #[test]
    fn renames_embedded_textures_only() {
        let mut wanted = MaterialSet::new(valve());
        wanted.insert('M', "LAVA").expect("insert");
        wanted.insert('M', "SKYLAVA").expect("insert");
        let mut choice = MaterialSet::new(valve());
        choice.insert('M', "METALFLOOR02X").expect("insert");
        let mut remapper = TextureRemapper::new(wanted, choice.choice_cut());

        let mut textures = vec![
            test_texture("+0lava"),
            test_texture("+1lava"),
            test_texture("brick"),
            MipTex::external("skylava", 64, 64).expect("external"),
        ];
        let report = apply_remap(&mut remapper, &mut textures);
        assert_eq!(report, RemapReport { renamed: 2, unchanged: 1 });
        assert_eq!(textures[0].name(), "+0METALFLOOR02X");
        assert_eq!(textures[1].name(), "+1METALFLOOR02X");
        assert_eq!(textures[2].name(), "brick");
        assert_eq!(textures[3].name(), "skylava");
    }
}
