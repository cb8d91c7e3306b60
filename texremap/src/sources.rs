//! Where remap requests come from: `info_texture_remap` entities, the
//! per-map custom materials file and an explicitly given file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use compat_goldsrc::entities::{Entity, EntityList};

use crate::config::GameMaterials;
use crate::locate::custommat_path;
use crate::material_set::{MaterialError, MaterialSet};
use crate::names::{base_key, is_metadata_key, is_reserved};

pub const REMAP_CLASSNAME: &str = "info_texture_remap";
pub const MATERIALS_PATH_KEY: &str = "materials_path";

pub fn remap_entities(entities: &EntityList) -> impl Iterator<Item = &Entity> {
    entities.by_classname(REMAP_CLASSNAME)
}

/// Union of the single-letter assignments of every remap entity.
pub fn wanted_from_entities(entities: &EntityList, materials: &Arc<GameMaterials>) -> MaterialSet {
    let mut wanted = MaterialSet::new(Arc::clone(materials));
    for entity in remap_entities(entities) {
        wanted |= &MaterialSet::from_entity(entity, Arc::clone(materials));
    }
    wanted
}

/// Direct renames: remap entity keys whose value is a whole texture name.
pub fn overrides_from_entities(entities: &EntityList) -> BTreeMap<String, String> {
    let mut overrides = BTreeMap::new();
    for entity in remap_entities(entities) {
        for (key, value) in entity.iter() {
            if is_metadata_key(key) || is_reserved(key) || value.chars().count() <= 1 {
                continue;
            }
            overrides.insert(base_key(key), value.to_string());
        }
    }
    overrides
}

/// Collects the wanted set from, in order, the remap entities, the map's
/// `<stem>_custommat.txt` and `extra`. Unless `read_all` is set, the first
/// source that yields entries ends the search.
pub fn load_wanted_set(
    entities: &EntityList,
    map_path: &Path,
    extra: Option<&Path>,
    materials: &Arc<GameMaterials>,
    read_all: bool,
) -> Result<MaterialSet, MaterialError> {
    let mut wanted = wanted_from_entities(entities, materials);
    if !wanted.is_empty() {
        log::info!("{} remap entries from {} entities", wanted.len(), REMAP_CLASSNAME);
        if !read_all {
            return Ok(wanted);
        }
    }

    let files = [Some(custommat_path(map_path)), extra.map(Path::to_path_buf)];
    for path in files.into_iter().flatten() {
        if !path.is_file() {
            log::debug!("no custom materials at {}", path.display());
            continue;
        }
        let found = MaterialSet::from_materials_file(&path, Arc::clone(materials))?;
        log::info!("{} remap entries from {}", found.len(), path.display());
        wanted |= &found;
        if !read_all && !wanted.is_empty() {
            break;
        }
    }
    Ok(wanted)
}

/// Writes the assignments of `wanted` into the first remap entity, creating
/// one when the map has none.
pub fn store_wanted_set(entities: &mut EntityList, wanted: &MaterialSet) {
    if remap_entities(entities).next().is_none() {
        let mut entity = Entity::with_classname(REMAP_CLASSNAME);
        entity.set("origin", "0 0 0");
        entities.push(entity);
    }
    if let Some(entity) = entities.by_classname_mut(REMAP_CLASSNAME).next() {
        for (letter, names) in wanted.iter() {
            for name in names {
                entity.set(name, &letter.to_string());
            }
        }
    }
}

/// WAD files listed by worldspawn's `wad` key, optionally reduced to file
/// names.
pub fn wad_list(entities: &EntityList, strip_paths: bool) -> Vec<String> {
    let Some(wads) = entities.worldspawn().and_then(|world| world.get("wad")) else {
        return Vec::new();
    };
    wads.split(';')
        .filter(|item| !item.is_empty())
        .map(|item| {
            if strip_paths {
                item.rsplit(['/', '\\']).next().unwrap_or(item).to_string()
            } else {
                item.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material_set::tests::valve;
    use std::fs;

    fn map_entities() -> EntityList {
        let mut world = Entity::with_classname("worldspawn");
        world.set("wad", "\\half-life\\valve\\halflife.wad;/mods/decals.wad;");
        let mut remap = Entity::with_classname(REMAP_CLASSNAME);
        remap.set("origin", "0 0 0");
        remap.set(MATERIALS_PATH_KEY, "sound/materials.txt");
        remap.set("lava", "M");
        remap.set("+0crate", "w");
        remap.set("oldname", "NEWNAME");
        remap.set("sky", "OTHERSKY");
        EntityList::new(vec![world, remap])
    }

    #[test]
    fn entities_give_wanted_and_overrides() {
        let entities = map_entities();
        let wanted = wanted_from_entities(&entities, &valve());
        assert_eq!(wanted.letter_of("LAVA"), Some('M'));
        assert_eq!(wanted.letter_of("CRATE"), Some('W'));
        assert_eq!(wanted.len(), 2);

        let overrides = overrides_from_entities(&entities);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("OLDNAME").map(String::as_str), Some("NEWNAME"));
    }

    #[test]
    fn entity_source_wins_unless_reading_all() {
        let dir = tempfile::tempdir().expect("tempdir");
        let map_path = dir.path().join("c1a0.bsp");
        fs::write(dir.path().join("c1a0_custommat.txt"), "Y WINDOW\n").expect("write");
        let extra = dir.path().join("extra.txt");
        fs::write(&extra, "G GRATE\n").expect("write");

        let entities = map_entities();
        let first = load_wanted_set(&entities, &map_path, Some(&extra), &valve(), false)
            .expect("load");
        assert_eq!(first.len(), 2);
        assert!(!first.contains("WINDOW"));

        let all = load_wanted_set(&entities, &map_path, Some(&extra), &valve(), true)
            .expect("load");
        assert_eq!(all.len(), 4);
        assert_eq!(all.letter_of("GRATE"), Some('G'));
    }

    #[test]
    fn falls_through_to_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let map_path = dir.path().join("c1a0.bsp");
        let extra = dir.path().join("extra.txt");
        fs::write(&extra, "G GRATE\n").expect("write");

        let entities = EntityList::new(vec![Entity::with_classname("worldspawn")]);
        let wanted = load_wanted_set(&entities, &map_path, Some(&extra), &valve(), false)
            .expect("load");
        assert_eq!(wanted.letter_of("GRATE"), Some('G'));

        fs::write(dir.path().join("c1a0_custommat.txt"), "Y WINDOW\n").expect("write");
        let wanted = load_wanted_set(&entities, &map_path, Some(&extra), &valve(), false)
            .expect("load");
        assert!(wanted.contains("WINDOW"));
        assert!(!wanted.contains("GRATE"));
    }

    #[test]
    fn stores_wanted_set_in_new_entity() {
        let mut entities = EntityList::new(vec![Entity::with_classname("worldspawn")]);
        let mut wanted = MaterialSet::new(valve());
        wanted.insert('M', "LAVA").expect("insert");
        store_wanted_set(&mut entities, &wanted);
        let stored = remap_entities(&entities).next().expect("entity");
        assert_eq!(stored.get("LAVA"), Some("M"));
        assert_eq!(wanted_from_entities(&entities, &valve()), wanted);
    }

    #[test]
    fn lists_wads() {
        let entities = map_entities();
        assert_eq!(
            wad_list(&entities, false),
            vec!["\\half-life\\valve\\halflife.wad", "/mods/decals.wad"]
        );
        assert_eq!(wad_list(&entities, true), vec!["halflife.wad", "decals.wad"]);
        assert!(wad_list(&EntityList::new(Vec::new()), true).is_empty());
    }
}
