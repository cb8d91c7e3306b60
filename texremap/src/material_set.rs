//! Texture base names grouped by material letter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::ops::{BitOr, BitOrAssign, Sub, SubAssign};
use std::path::Path;
use std::sync::Arc;

use compat_goldsrc::entities::Entity;
use compat_goldsrc::text::decode_cp1252;
use thiserror::Error;

use crate::config::GameMaterials;
use crate::names::{
    base_key, is_metadata_key, is_reserved, FALLBACK_NAME, MIN_USABLE_LEN, NAME_CAPACITY,
};

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("unable to read materials file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("material {letter} is not used by {game}")]
    UnknownLetter { letter: char, game: String },
}

/// Per-letter sets of uppercase base names. A name lives under at most one
/// letter: inserting it under another letter moves it.
#[derive(Clone, Debug)]
pub struct MaterialSet {
    materials: Arc<GameMaterials>,
    sets: BTreeMap<char, BTreeSet<String>>,
}

impl PartialEq for MaterialSet {
    fn eq(&self, other: &Self) -> bool {
        self.sets == other.sets
    }
}

impl Eq for MaterialSet {}

impl MaterialSet {
    pub fn new(materials: Arc<GameMaterials>) -> Self {
        let sets = materials
            .alphabet()
            .iter()
            .map(|letter| (*letter, BTreeSet::new()))
            .collect();
        Self { materials, sets }
    }

    pub fn materials(&self) -> &Arc<GameMaterials> {
        &self.materials
    }

    /// Files `name` under `letter`, returning whether the set changed.
    pub fn insert(&mut self, letter: char, name: &str) -> Result<bool, MaterialError> {
        let letter = letter.to_ascii_uppercase();
        if !self.materials.contains(letter) {
            return Err(MaterialError::UnknownLetter {
                letter,
                game: self.materials.id().to_string(),
            });
        }
        let key = name.to_ascii_uppercase();
        let mut moved = false;
        for (other, set) in self.sets.iter_mut() {
            if *other != letter {
                moved |= set.remove(&key);
            }
        }
        let added = self
            .sets
            .get_mut(&letter)
            .map(|set| set.insert(key))
            .unwrap_or(false);
        Ok(added || moved)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let key = base_key(name);
        self.sets
            .values_mut()
            .fold(false, |removed, set| set.remove(&key) || removed)
    }

    /// Whether the base name of `name` is filed under any letter.
    pub fn contains(&self, name: &str) -> bool {
        self.letter_of(name).is_some()
    }

    /// First letter, in alphabet order, whose set holds the base name.
    pub fn letter_of(&self, name: &str) -> Option<char> {
        let key = base_key(name);
        self.materials
            .alphabet()
            .iter()
            .copied()
            .find(|letter| self.sets.get(letter).is_some_and(|set| set.contains(&key)))
    }

    pub fn names(&self, letter: char) -> impl Iterator<Item = &str> {
        self.sets
            .get(&letter)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Letters with their names, in alphabet order.
    pub fn iter(&self) -> impl Iterator<Item = (char, &BTreeSet<String>)> {
        self.materials
            .alphabet()
            .iter()
            .filter_map(|letter| self.sets.get(letter).map(|set| (*letter, set)))
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(BTreeSet::is_empty)
    }

    pub fn len_of(&self, letter: char) -> usize {
        self.sets.get(&letter).map(BTreeSet::len).unwrap_or(0)
    }

    /// Names usable as remap candidates: per letter, those whose length
    /// leaves room for padding. The default letter only offers the fallback
    /// name.
    pub fn choice_cut(&self) -> MaterialSet {
        let default = self.materials.default_letter();
        let sets = self
            .sets
            .iter()
            .map(|(letter, names)| {
                let cut = if *letter == default {
                    BTreeSet::from([FALLBACK_NAME.to_string()])
                } else {
                    names
                        .iter()
                        .filter(|name| (MIN_USABLE_LEN..NAME_CAPACITY).contains(&name.chars().count()))
                        .cloned()
                        .collect()
                };
                (*letter, cut)
            })
            .collect();
        MaterialSet {
            materials: Arc::clone(&self.materials),
            sets,
        }
    }

    /// Parses `<LETTER> <name>` lines. Text after `//` is ignored, as are
    /// letters the game does not use. Entries still carrying an engine
    /// prefix are accepted after stripping it.
    pub fn parse_materials(text: &str, materials: Arc<GameMaterials>) -> Self {
        let mut set = Self::new(materials);
        let mut prefixed = 0usize;
        for line in text.lines() {
            let line = line.split("//").next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (letter, name) = match (fields.next(), fields.next()) {
                (Some(letter), Some(name)) => (letter, name),
                _ => continue,
            };
            let mut letter_chars = letter.chars();
            let letter = match (letter_chars.next(), letter_chars.next()) {
                (Some(letter), None) => letter.to_ascii_uppercase(),
                _ => continue,
            };
            if !set.materials.contains(letter) {
                continue;
            }
            let key = base_key(name);
            if key.len() != name.len() {
                prefixed += 1;
            }
            // letter was checked against the alphabet above
            let _ = set.insert(letter, &key);
        }
        if prefixed > 0 {
            log::warn!(
                "{} materials entries carry texture prefixes; this game may not \
                 support material remapping",
                prefixed
            );
        }
        set
    }

    pub fn from_materials_file(
        path: &Path,
        materials: Arc<GameMaterials>,
    ) -> Result<Self, MaterialError> {
        log::info!("reading materials file {}", path.display());
        let bytes = fs::read(path).map_err(|source| MaterialError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse_materials(&decode_cp1252(&bytes), materials))
    }

    /// Reads `"<texture>" "<letter>"` pairs from an entity.
    pub fn from_entity(entity: &Entity, materials: Arc<GameMaterials>) -> Self {
        let mut set = Self::new(materials);
        for (key, value) in entity.iter() {
            if is_metadata_key(key) || is_reserved(key) {
                continue;
            }
            let mut chars = value.chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(letter), None) => letter.to_ascii_uppercase(),
                _ => continue,
            };
            if set.insert(letter, &base_key(key)).is_err() {
                log::warn!("{}: material {} is not used by this game", key, letter);
            }
        }
        set
    }

    /// `materials.txt` style listing, grouped by letter with labels as
    /// comments.
    pub fn to_materials_text(&self) -> String {
        let mut out = String::new();
        for (letter, names) in self.iter().filter(|(_, names)| !names.is_empty()) {
            let label = self.materials.label(letter).unwrap_or("");
            let _ = writeln!(out, "//  {} - {}", letter, label);
            for name in names {
                let _ = writeln!(out, "{} {}", letter, name);
            }
        }
        out
    }
}

impl BitOrAssign<&MaterialSet> for MaterialSet {
    fn bitor_assign(&mut self, other: &MaterialSet) {
        for (letter, names) in &other.sets {
            if !self.materials.contains(*letter) {
                continue;
            }
            for name in names {
                let _ = self.insert(*letter, name);
            }
        }
    }
}

impl SubAssign<&MaterialSet> for MaterialSet {
    fn sub_assign(&mut self, other: &MaterialSet) {
        for (letter, names) in self.sets.iter_mut() {
            if let Some(remove) = other.sets.get(letter) {
                names.retain(|name| !remove.contains(name));
            }
        }
    }
}

impl BitOr<&MaterialSet> for &MaterialSet {
    type Output = MaterialSet;

    fn bitor(self, other: &MaterialSet) -> MaterialSet {
        let mut out = self.clone();
        out |= other;
        out
    }
}

impl Sub<&MaterialSet> for &MaterialSet {
    type Output = MaterialSet;

    fn sub(self, other: &MaterialSet) -> MaterialSet {
        let mut out = self.clone();
        out -= other;
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::MaterialConfig;

    pub(crate) fn valve() -> Arc<GameMaterials> {
        MaterialConfig::builtin()
            .expect("builtin")
            .resolve("valve")
            .expect("valve")
    }

    fn set_of(entries: &[(char, &str)]) -> MaterialSet {
        let mut set = MaterialSet::new(valve());
        for (letter, name) in entries {
            set.insert(*letter, name).expect("insert");
        }
        set
    }

    #[test]
    fn parses_materials_file_lines() {
        let text = "// comment\nM METALWALL01\nC  CRETE1 // trailing\nQ UNKNOWN\nbad\nM +0FRAMED\n";
        let set = MaterialSet::parse_materials(text, valve());
        assert_eq!(set.letter_of("METALWALL01"), Some('M'));
        assert_eq!(set.letter_of("crete1"), Some('C'));
        assert_eq!(set.letter_of("FRAMED"), Some('M'));
        assert!(!set.contains("UNKNOWN"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn prefixed_record_matches_base_name() {
        let set = MaterialSet::parse_materials("M METALWALL01\n", valve());
        assert!(set.contains("+0metalwall01"));
        assert_eq!(set.letter_of("+0metalwall01"), Some('M'));
    }

    #[test]
    fn classification_is_exclusive() {
        let mut set = set_of(&[('M', "WALL")]);
        assert!(set.insert('W', "wall").expect("insert"));
        assert_eq!(set.letter_of("WALL"), Some('W'));
        assert_eq!(set.len(), 1);
        assert!(!set.insert('W', "WALL").expect("insert"));
    }

    #[test]
    fn unknown_letters_are_rejected() {
        let mut set = MaterialSet::new(valve());
        let err = set.insert('X', "GRASS").expect_err("letter");
        assert!(matches!(err, MaterialError::UnknownLetter { letter: 'X', .. }));
    }

    #[test]
    fn union_and_difference_laws() {
        let a = set_of(&[('M', "A1"), ('W', "A2"), ('C', "SHARED")]);
        let b = set_of(&[('M', "B1"), ('C', "SHARED")]);

        let union = &a | &b;
        assert_eq!(&union | &b, union);
        assert!(union.len() >= a.len().max(b.len()));

        let diff = &a - &b;
        assert_eq!(&diff - &b, diff);
        assert!(!diff.contains("SHARED"));
        assert!(diff.contains("A1"));

        let mut in_place = a.clone();
        in_place |= &b;
        assert_eq!(in_place, union);
        in_place -= &b;
        assert_eq!(in_place.len(), 2);
    }

    #[test]
    fn choice_cut_filters_by_length() {
        let set = set_of(&[
            ('M', "SHORT"),
            ('M', "TWELVECHARSX"),
            ('M', "FOURTEENCHARSX"),
            ('M', "FIFTEENCHARSXXX"),
            ('C', "CONCRETEWALL01"),
        ]);
        let cut = set.choice_cut();
        let metal: Vec<_> = cut.names('M').collect();
        assert_eq!(metal, vec!["FOURTEENCHARSX", "TWELVECHARSX"]);
        let concrete: Vec<_> = cut.names('C').collect();
        assert_eq!(concrete, vec![FALLBACK_NAME]);
        assert!(MaterialSet::new(valve()).choice_cut().contains(FALLBACK_NAME));
    }

    #[test]
    fn choice_cut_counts_characters() {
        let set = set_of(&[('M', "CAFÉWALL001"), ('M', "CAFÉWALL0001"), ('M', "CAFÉWALL000001")]);
        let cut = set.choice_cut();
        let metal: Vec<_> = cut.names('M').collect();
        assert_eq!(metal, vec!["CAFÉWALL000001", "CAFÉWALL0001"]);
    }

    #[test]
    fn reads_entity_assignments() {
        let mut entity = Entity::with_classname("info_texture_remap");
        entity.set("origin", "0 0 0");
        entity.set("_comment", "x");
        entity.set("+0lava", "m");
        entity.set("crate", "W");
        entity.set("sky", "M");
        entity.set("OLDNAME", "NEWNAME");
        entity.set("grass", "X");
        let set = MaterialSet::from_entity(&entity, valve());
        assert_eq!(set.letter_of("LAVA"), Some('M'));
        assert_eq!(set.letter_of("CRATE"), Some('W'));
        assert!(!set.contains("SKY"));
        assert!(!set.contains("OLDNAME"));
        assert!(!set.contains("GRASS"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn materials_text_round_trips() {
        let set = set_of(&[('M', "METALWALL01"), ('Y', "WINDOW")]);
        let text = set.to_materials_text();
        assert!(text.contains("M METALWALL01\n"));
        assert!(text.contains("//  Y - Glass\n"));
        assert_eq!(MaterialSet::parse_materials(&text, valve()), set);
    }
}
