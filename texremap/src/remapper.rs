//! Renames textures so their base names land on a wanted material.
//!
//! The engine matches at most the first 12 characters of a texture name
//! against `materials.txt`, so any name that starts with a known entry and
//! pads the rest of the 15 character capacity picks up that entry's
//! material. Candidates are drawn in a fixed order, which makes a pass
//! reproducible from its inputs alone.

use std::collections::HashMap;

use crate::material_set::MaterialSet;
use crate::names::{is_reserved, TextureName, DEFAULT_PAD_ALPHABET, MAX_PREFIX_LEN, NAME_CAPACITY};

/// Ordered padded names for one (letter, length) pair.
#[derive(Debug)]
struct CandidateSupply {
    names: Vec<String>,
    target_len: usize,
    pad: Vec<char>,
    name_index: usize,
    counter: u128,
}

impl CandidateSupply {
    fn new(names: Vec<String>, target_len: usize, pad: Vec<char>) -> Self {
        Self {
            names,
            target_len,
            pad,
            name_index: 0,
            counter: 0,
        }
    }

    /// Paddings of `pad_len` characters available for one name.
    fn paddings(&self, pad_len: usize) -> u128 {
        let Ok(exp) = u32::try_from(pad_len) else {
            return u128::MAX;
        };
        (self.pad.len() as u128)
            .checked_pow(exp)
            .unwrap_or(u128::MAX)
    }

    fn next_candidate(&mut self) -> Option<String> {
        loop {
            let name = self.names.get(self.name_index)?;
            let name_len = name.chars().count();
            if name_len > self.target_len {
                self.advance_name();
                continue;
            }
            let pad_len = self.target_len - name_len;
            if self.counter >= self.paddings(pad_len) {
                self.advance_name();
                continue;
            }

            // most significant pad position first
            let base = self.pad.len().max(1) as u128;
            let mut digits = vec![0usize; pad_len];
            let mut rest = self.counter;
            for digit in digits.iter_mut().rev() {
                *digit = (rest % base) as usize;
                rest /= base;
            }
            let mut candidate = name.clone();
            candidate.extend(digits.into_iter().map(|digit| self.pad[digit]));
            self.counter += 1;
            return Some(candidate);
        }
    }

    fn advance_name(&mut self) {
        self.name_index += 1;
        self.counter = 0;
    }
}

/// One remap pass. Candidate supplies and the group cache live as long as
/// the instance; a fresh instance replays the same sequence.
#[derive(Debug)]
pub struct TextureRemapper {
    wanted: MaterialSet,
    choice: MaterialSet,
    overrides: HashMap<String, String>,
    groups: HashMap<String, String>,
    supplies: HashMap<(char, usize), CandidateSupply>,
    pad_alphabet: Vec<char>,
}

impl TextureRemapper {
    /// `choice` is expected to be a choice cut already.
    pub fn new(wanted: MaterialSet, choice: MaterialSet) -> Self {
        Self {
            wanted,
            choice,
            overrides: HashMap::new(),
            groups: HashMap::new(),
            supplies: HashMap::new(),
            pad_alphabet: DEFAULT_PAD_ALPHABET.chars().collect(),
        }
    }

    /// Direct renames by base name, applied before anything else.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.overrides.extend(
            overrides
                .into_iter()
                .map(|(old, new)| (old.as_ref().to_ascii_uppercase(), new.into())),
        );
        self
    }

    pub fn with_pad_alphabet(mut self, alphabet: &str) -> Self {
        self.pad_alphabet = alphabet.chars().collect();
        self.supplies.clear();
        self
    }

    pub fn wanted(&self) -> &MaterialSet {
        &self.wanted
    }

    pub fn choice(&self) -> &MaterialSet {
        &self.choice
    }

    /// New name for `name`, or `name` itself when it stays as is.
    pub fn remap(&mut self, name: &str) -> String {
        let parsed = TextureName::parse(name);
        let key = parsed.base_key();
        let prefix_len = parsed.prefix.chars().count();

        if let Some(target) = self.overrides.get(&key) {
            log::debug!("{}: direct remap to {}", name, target);
            return format!("{}{}", parsed.prefix, target);
        }

        let letter = match self.wanted.letter_of(&key) {
            Some(letter) if !is_reserved(name) && prefix_len <= MAX_PREFIX_LEN => letter,
            _ => {
                log::debug!("{}: not remapped", name);
                return name.to_string();
            }
        };

        if let Some(cached) = self.groups.get(&key) {
            return format!("{}{}", parsed.prefix, cached);
        }

        let target_len = NAME_CAPACITY - prefix_len;
        let supply = self
            .supplies
            .entry((letter, target_len))
            .or_insert_with(|| {
                CandidateSupply::new(
                    self.choice.names(letter).map(str::to_string).collect(),
                    target_len,
                    self.pad_alphabet.clone(),
                )
            });
        let Some(replacement) = supply.next_candidate() else {
            log::debug!("{}: no {} names left for length {}", name, letter, target_len);
            return name.to_string();
        };

        if parsed.is_grouped() {
            self.groups.insert(key, replacement.clone());
        }
        format!("{}{}", parsed.prefix, replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material_set::tests::valve;

    fn wanted() -> MaterialSet {
        let mut set = MaterialSet::new(valve());
        for (letter, name) in [('M', "LAVA"), ('M', "PIPES"), ('W', "CRATE"), ('C', "FLOOR")] {
            set.insert(letter, name).expect("insert");
        }
        set
    }

    fn choice() -> MaterialSet {
        let mut set = MaterialSet::new(valve());
        for (letter, name) in [('M', "METALWALL01"), ('M', "METALFLOOR02X"), ('W', "WOODCRATE001")] {
            set.insert(letter, name).expect("insert");
        }
        set.insert('M', "METALPANEL0001").expect("insert");
        set.choice_cut()
    }

    #[test]
    fn pads_to_full_capacity() {
        let mut remapper = TextureRemapper::new(wanted(), choice());
        assert_eq!(remapper.remap("lava"), "METALFLOOR02X00");
        assert_eq!(remapper.remap("pipes"), "METALFLOOR02X01");
        assert_eq!(remapper.remap("crate"), "WOODCRATE001000");
        assert_eq!(remapper.remap("floor"), "__NOMATERIAL000");
    }

    #[test]
    fn prefix_shortens_target() {
        let mut remapper = TextureRemapper::new(wanted(), choice());
        assert_eq!(remapper.remap("!lava"), "!METALFLOOR02X0");
        assert_eq!(remapper.remap("+0lava"), "+0METALFLOOR02X");
        assert_eq!(remapper.remap("+1lava"), "+1METALFLOOR02X");
    }

    #[test]
    fn prefix_length_counts_characters() {
        let mut remapper = TextureRemapper::new(wanted(), choice());
        assert_eq!(remapper.remap("+élava"), "+éMETALFLOOR02X");
        assert_eq!(remapper.remap("+é{lava"), "+é{lava");
    }

    #[test]
    fn grouped_names_share_base() {
        let mut remapper = TextureRemapper::new(wanted(), choice());
        let first = remapper.remap("+0lava");
        let second = remapper.remap("+1lava");
        let a = TextureName::parse(&first);
        let b = TextureName::parse(&second);
        assert_eq!(a.base, b.base);
        assert_ne!(a.prefix, b.prefix);
    }

    #[test]
    fn ungrouped_repeats_draw_new_names() {
        let mut remapper = TextureRemapper::new(wanted(), choice());
        assert_ne!(remapper.remap("lava"), remapper.remap("lava"));
    }

    #[test]
    fn skips_unwanted_and_reserved() {
        let mut wanted = wanted();
        wanted.insert('M', "SKY").expect("insert");
        let mut remapper = TextureRemapper::new(wanted, choice());
        assert_eq!(remapper.remap("brick"), "brick");
        assert_eq!(remapper.remap("sky"), "sky");
    }

    #[test]
    fn overrides_win() {
        let mut remapper = TextureRemapper::new(wanted(), choice())
            .with_overrides([("lava", "HOTSTUFF"), ("unknown", "KNOWN")]);
        assert_eq!(remapper.remap("+0lava"), "+0HOTSTUFF");
        assert_eq!(remapper.remap("unknown"), "KNOWN");
    }

    #[test]
    fn fresh_instances_are_deterministic() {
        let names = ["lava", "+0pipes", "+1pipes", "crate", "lava", "{crate", "floor"];
        let mut a = TextureRemapper::new(wanted(), choice());
        let mut b = TextureRemapper::new(wanted(), choice());
        let first: Vec<_> = names.iter().map(|name| a.remap(name)).collect();
        let second: Vec<_> = names.iter().map(|name| b.remap(name)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn exhaustion_leaves_names_unchanged() {
        let mut wanted = MaterialSet::new(valve());
        wanted.insert('M', "LAVA").expect("insert");
        wanted.insert('M', "SLIME").expect("insert");
        let mut choice = MaterialSet::new(valve());
        choice.insert('M', "METALWALL01XYZ").expect("insert");
        let mut remapper = TextureRemapper::new(wanted, choice).with_pad_alphabet("0");
        // 14 + one pad character fills the name
        assert_eq!(remapper.remap("lava"), "METALWALL01XYZ0");
        assert_eq!(remapper.remap("slime"), "slime");

        let mut exact = MaterialSet::new(valve());
        exact.insert('M', "METALWALL01XYZ").expect("insert");
        let mut wanted = MaterialSet::new(valve());
        wanted.insert('M', "LAVA").expect("insert");
        wanted.insert('M', "SLIME").expect("insert");
        let mut remapper = TextureRemapper::new(wanted, exact).with_pad_alphabet("0");
        // a one character prefix leaves no room for padding
        assert_eq!(remapper.remap("!lava"), "!METALWALL01XYZ");
        assert_eq!(remapper.remap("!slime"), "!slime");
        assert_eq!(remapper.remap("!lava"), "!lava");
    }

    #[test]
    fn supply_enumerates_lexicographically() {
        let mut supply = CandidateSupply::new(
            vec!["AB".to_string(), "C".to_string()],
            3,
            vec!['0', '1'],
        );
        let drawn: Vec<_> = std::iter::from_fn(|| supply.next_candidate()).collect();
        assert_eq!(drawn, vec!["AB0", "AB1", "C00", "C01", "C10", "C11"]);
    }

    #[test]
    fn supply_skips_names_that_do_not_fit() {
        let mut supply = CandidateSupply::new(
            vec!["TOOLONG".to_string(), "OK".to_string()],
            2,
            vec!['Z'],
        );
        assert_eq!(supply.next_candidate().as_deref(), Some("OK"));
        assert_eq!(supply.next_candidate(), None);
    }
}
