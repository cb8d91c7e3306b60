//! Finding files around a map inside a game install
//! (`<install>/<mod>/maps/<map>.bsp`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use compat_goldsrc::entities::EntityList;
use regex::Regex;

use crate::sources::{remap_entities, MATERIALS_PATH_KEY};

pub const CUSTOMMAT_SUFFIX: &str = "_custommat.txt";
pub const TEXINFO_SUFFIX: &str = "_texinfo.txt";
pub const MATERIALS_FILE: &str = "sound/materials.txt";
/// Game every mod falls back to.
pub const BASE_GAME: &str = "valve";

fn mod_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)_(addon|hd|downloads)$").expect("mod suffix pattern is valid")
    })
}

fn fallback_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?mi)^\s*fallback_dir\s+"([^"]*)""#).expect("liblist pattern is valid")
    })
}

/// Mod folder name without its `_addon`, `_hd` or `_downloads` suffix.
pub fn strip_mod_suffix(name: &str) -> String {
    mod_suffix_pattern().replace(name, "").into_owned()
}

/// Mod folder holding the map, when the map sits in a `maps` folder.
pub fn game_dir(map_path: &Path) -> Option<PathBuf> {
    let maps = map_path.parent()?;
    let is_maps = maps
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.eq_ignore_ascii_case("maps"));
    if !is_maps {
        return None;
    }
    maps.parent().map(Path::to_path_buf)
}

/// Lowercase mod name derived from the map location.
pub fn mod_name_from_map(map_path: &Path) -> Option<String> {
    let dir = game_dir(map_path)?;
    let name = dir.file_name()?.to_str()?;
    Some(strip_mod_suffix(name).to_ascii_lowercase())
}

/// Folders to search, most specific first: the mod folder, the folder
/// without its suffix, the `fallback_dir` of its `liblist.gam`, then the
/// base game.
pub fn modpath_fallbacks(mod_path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![mod_path.to_path_buf()];
    let name = mod_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let base = mod_path.with_file_name(strip_mod_suffix(name));
    paths.push(base.clone());

    if let Ok(liblist) = fs::read(base.join("liblist.gam")) {
        let text = compat_goldsrc::text::decode_cp1252(&liblist);
        if let Some(dir) = fallback_dir_pattern()
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .filter(|dir| !dir.as_str().is_empty())
        {
            paths.push(base.with_file_name(dir.as_str()));
        }
    }
    paths.push(base.with_file_name(BASE_GAME));

    let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

/// Materials file for the map: a `materials_path` on a remap entity
/// (absolute, or relative to the map folder or the mod folder), then
/// `explicit`, then `sound/materials.txt` in the mod folder fallbacks.
pub fn search_materials_file(
    map_path: &Path,
    entities: &EntityList,
    explicit: Option<&Path>,
) -> Option<PathBuf> {
    let mut had_entity = false;
    for entity in remap_entities(entities) {
        had_entity = true;
        let Some(value) = entity
            .get(MATERIALS_PATH_KEY)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            continue;
        };
        log::info!("materials path {} from {}", value, entity.classname().unwrap_or(""));
        let path = Path::new(value);
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            if let Some(dir) = map_path.parent() {
                candidates.push(dir.join(path));
            }
            if let Some(dir) = game_dir(map_path) {
                candidates.push(dir.join(path));
            }
        }
        if let Some(found) = candidates.into_iter().find(|candidate| candidate.is_file()) {
            return Some(found);
        }
    }
    if had_entity {
        log::warn!("no usable materials path on remap entities");
    }

    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        log::warn!("materials file {} not found", path.display());
    }

    if let Some(dir) = game_dir(map_path) {
        for mod_path in modpath_fallbacks(&dir) {
            let downloads = mod_path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.to_ascii_lowercase().ends_with("_downloads"));
            if downloads {
                continue;
            }
            let candidate = mod_path.join(MATERIALS_FILE);
            log::debug!("looking for {}", candidate.display());
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    log::warn!("no materials file found for {}", map_path.display());
    None
}

/// Locates each WAD file name in the mod folder fallbacks.
pub fn search_wads(map_path: &Path, wads: &[String]) -> BTreeMap<String, Option<PathBuf>> {
    let mut found: BTreeMap<String, Option<PathBuf>> =
        wads.iter().map(|wad| (wad.clone(), None)).collect();
    let Some(dir) = game_dir(map_path) else {
        return found;
    };
    for mod_path in modpath_fallbacks(&dir) {
        for (wad, slot) in found.iter_mut().filter(|(_, slot)| slot.is_none()) {
            let candidate = mod_path.join(wad);
            if candidate.is_file() {
                log::info!("found {} in {}", wad, mod_path.display());
                *slot = Some(candidate);
            }
        }
        if found.values().all(Option::is_some) {
            break;
        }
    }
    found
}

fn sibling_with_suffix(map_path: &Path, suffix: &str) -> PathBuf {
    let stem = map_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    map_path.with_file_name(format!("{stem}{suffix}"))
}

pub fn custommat_path(map_path: &Path) -> PathBuf {
    sibling_with_suffix(map_path, CUSTOMMAT_SUFFIX)
}

pub fn texinfo_path(map_path: &Path) -> PathBuf {
    sibling_with_suffix(map_path, TEXINFO_SUFFIX)
}

/// Copies `path` to `<path>.bak` unless a backup already exists. Returns
/// the backup path when one was written.
pub fn backup_file(path: &Path) -> io::Result<Option<PathBuf>> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    let backup = path.with_file_name(name);
    if backup.exists() {
        return Ok(None);
    }
    fs::copy(path, &backup)?;
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use compat_goldsrc::entities::Entity;
    use crate::sources::REMAP_CLASSNAME;

    fn install() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for folder in ["valve/sound", "mymod_hd/maps", "mymod", "basemod/sound"] {
            fs::create_dir_all(dir.path().join(folder)).expect("mkdir");
        }
        fs::write(dir.path().join("valve/sound/materials.txt"), "C CONCRETE\n").expect("write");
        fs::write(dir.path().join("mymod/liblist.gam"), "game \"My Mod\"\nfallback_dir \"basemod\"\n")
            .expect("write");
        dir
    }

    #[test]
    fn mod_names() {
        assert_eq!(strip_mod_suffix("cstrike_downloads"), "cstrike");
        assert_eq!(strip_mod_suffix("valve_HD"), "valve");
        assert_eq!(strip_mod_suffix("hd_pack"), "hd_pack");
        assert_eq!(
            mod_name_from_map(Path::new("/games/Gearbox_addon/maps/of1a1.bsp")).as_deref(),
            Some("gearbox")
        );
        assert_eq!(mod_name_from_map(Path::new("/tmp/c1a0.bsp")), None);
    }

    #[test]
    fn fallbacks_follow_liblist() {
        let dir = install();
        let paths = modpath_fallbacks(&dir.path().join("mymod_hd"));
        let names: Vec<_> = paths
            .iter()
            .map(|path| path.file_name().and_then(|n| n.to_str()).unwrap_or(""))
            .collect();
        assert_eq!(names, vec!["mymod_hd", "mymod", "basemod", "valve"]);
    }

    #[test]
    fn materials_search_order() {
        let dir = install();
        let map = dir.path().join("mymod_hd/maps/test.bsp");
        let empty = EntityList::new(Vec::new());

        let found = search_materials_file(&map, &empty, None).expect("found");
        assert_eq!(found, dir.path().join("valve").join(MATERIALS_FILE));

        fs::write(dir.path().join("basemod/sound/materials.txt"), "M METAL\n").expect("write");
        let found = search_materials_file(&map, &empty, None).expect("found");
        assert_eq!(found, dir.path().join("basemod").join(MATERIALS_FILE));

        let explicit = dir.path().join("explicit.txt");
        fs::write(&explicit, "W WOOD\n").expect("write");
        let found = search_materials_file(&map, &empty, Some(&explicit)).expect("found");
        assert_eq!(found, explicit);

        let mut remap = Entity::with_classname(REMAP_CLASSNAME);
        remap.set(MATERIALS_PATH_KEY, "mats.txt");
        fs::write(dir.path().join("mymod_hd/maps/mats.txt"), "W WOOD\n").expect("write");
        let entities = EntityList::new(vec![remap]);
        let found = search_materials_file(&map, &entities, Some(&explicit)).expect("found");
        assert_eq!(found, dir.path().join("mymod_hd/maps/mats.txt"));
    }

    #[test]
    fn finds_wads_in_fallbacks() {
        let dir = install();
        fs::write(dir.path().join("valve/halflife.wad"), b"WAD3").expect("write");
        fs::write(dir.path().join("mymod/mymod.wad"), b"WAD3").expect("write");
        let map = dir.path().join("mymod_hd/maps/test.bsp");
        let wads = vec!["halflife.wad".to_string(), "mymod.wad".to_string(), "gone.wad".to_string()];
        let found = search_wads(&map, &wads);
        assert_eq!(found["halflife.wad"], Some(dir.path().join("valve/halflife.wad")));
        assert_eq!(found["mymod.wad"], Some(dir.path().join("mymod/mymod.wad")));
        assert_eq!(found["gone.wad"], None);
    }

    #[test]
    fn sibling_paths() {
        let map = Path::new("/games/valve/maps/c1a0.bsp");
        assert_eq!(custommat_path(map), Path::new("/games/valve/maps/c1a0_custommat.txt"));
        assert_eq!(texinfo_path(map), Path::new("/games/valve/maps/c1a0_texinfo.txt"));
    }

    #[test]
    fn backup_does_not_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let map = dir.path().join("c1a0.bsp");
        fs::write(&map, b"first").expect("write");
        let backup = backup_file(&map).expect("backup").expect("written");
        assert_eq!(backup, dir.path().join("c1a0.bsp.bak"));
        fs::write(&map, b"second").expect("write");
        assert_eq!(backup_file(&map).expect("backup"), None);
        assert_eq!(fs::read(&backup).expect("read"), b"first");
    }
}
