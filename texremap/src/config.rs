//! Per-game material alphabets.
//!
//! ```toml
//! [games.valve]
//! materials = "CMDVGTSWPYFN"
//! default = "C"
//! [games.valve.labels]
//! C = "Concrete"
//!
//! [games.czero]
//! inherits = "cstrike"
//! materials = "X"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

const BUILTIN_MATERIALS: &str = include_str!("../materials.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid material config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown game {0:?}")]
    UnknownGame(String),
    #[error("game inheritance cycle: {0}")]
    InheritanceCycle(String),
    #[error("game {game:?}: invalid material letter {letter:?}")]
    InvalidLetter { game: String, letter: String },
    #[error("game {0:?} has no default material")]
    MissingDefault(String),
    #[error("game {game:?}: default material {letter} is not in its alphabet")]
    DefaultNotInAlphabet { game: String, letter: char },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameEntry {
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub materials: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialConfig {
    #[serde(default)]
    pub games: BTreeMap<String, GameEntry>,
}

/// Resolved material alphabet of one game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameMaterials {
    id: String,
    alphabet: Vec<char>,
    labels: BTreeMap<char, String>,
    default: char,
}

impl GameMaterials {
    pub fn new(id: &str, alphabet: &str, default: char) -> Result<Self, ConfigError> {
        let alphabet = parse_letters(id, alphabet)?;
        if !alphabet.contains(&default) {
            return Err(ConfigError::DefaultNotInAlphabet {
                game: id.to_string(),
                letter: default,
            });
        }
        Ok(Self {
            id: id.to_string(),
            alphabet,
            labels: BTreeMap::new(),
            default,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn contains(&self, letter: char) -> bool {
        self.alphabet.contains(&letter)
    }

    pub fn default_letter(&self) -> char {
        self.default
    }

    pub fn label(&self, letter: char) -> Option<&str> {
        self.labels.get(&letter).map(String::as_str)
    }
}

impl MaterialConfig {
    /// The configuration shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse_toml(BUILTIN_MATERIALS)
    }

    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_toml(&text)
    }

    /// Entries of `other` replace entries with the same id.
    pub fn merge(&mut self, other: MaterialConfig) {
        self.games.extend(other.games);
    }

    pub fn game_ids(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(String::as_str)
    }

    pub fn contains_game(&self, id: &str) -> bool {
        self.games.contains_key(id)
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<GameMaterials>, ConfigError> {
        let mut chain = Vec::new();
        let resolved = self.resolve_chain(id, &mut chain)?;
        let default = resolved
            .default
            .ok_or_else(|| ConfigError::MissingDefault(id.to_string()))?;
        if !resolved.alphabet.contains(&default) {
            return Err(ConfigError::DefaultNotInAlphabet {
                game: id.to_string(),
                letter: default,
            });
        }
        Ok(Arc::new(GameMaterials {
            id: id.to_string(),
            alphabet: resolved.alphabet,
            labels: resolved.labels,
            default,
        }))
    }

    fn resolve_chain(&self, id: &str, chain: &mut Vec<String>) -> Result<Partial, ConfigError> {
        if chain.iter().any(|seen| seen == id) {
            let mut cycle = chain.clone();
            cycle.push(id.to_string());
            return Err(ConfigError::InheritanceCycle(cycle.join(" -> ")));
        }
        let entry = self
            .games
            .get(id)
            .ok_or_else(|| ConfigError::UnknownGame(id.to_string()))?;
        chain.push(id.to_string());

        let mut resolved = match &entry.inherits {
            Some(parent) => self.resolve_chain(parent, chain)?,
            None => Partial::default(),
        };
        for letter in parse_letters(id, &entry.materials)? {
            if !resolved.alphabet.contains(&letter) {
                resolved.alphabet.push(letter);
            }
        }
        for (key, label) in &entry.labels {
            let letter = single_letter(id, key)?;
            resolved.labels.insert(letter, label.clone());
        }
        if let Some(default) = &entry.default {
            resolved.default = Some(single_letter(id, default)?);
        }
        Ok(resolved)
    }
}

#[derive(Default)]
struct Partial {
    alphabet: Vec<char>,
    labels: BTreeMap<char, String>,
    default: Option<char>,
}

fn parse_letters(game: &str, letters: &str) -> Result<Vec<char>, ConfigError> {
    let mut alphabet = Vec::new();
    for letter in letters.chars().filter(|c| !c.is_whitespace()) {
        if !letter.is_ascii_uppercase() {
            return Err(ConfigError::InvalidLetter {
                game: game.to_string(),
                letter: letter.to_string(),
            });
        }
        if !alphabet.contains(&letter) {
            alphabet.push(letter);
        }
    }
    Ok(alphabet)
}

fn single_letter(game: &str, text: &str) -> Result<char, ConfigError> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_uppercase() => Ok(letter),
        _ => Err(ConfigError::InvalidLetter {
            game: game.to_string(),
            letter: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_games_resolve() {
        let config = MaterialConfig::builtin().expect("builtin");
        for id in ["valve", "gearbox", "bshift", "cstrike", "czero", "czeror"] {
            let materials = config.resolve(id).expect(id);
            assert_eq!(materials.default_letter(), 'C');
            assert!(materials.alphabet().starts_with(&['C', 'M', 'D']));
        }
        let valve = config.resolve("valve").expect("valve");
        assert_eq!(valve.alphabet().iter().collect::<String>(), "CMDVGTSWPYFN");
        assert_eq!(valve.label('Y'), Some("Glass"));
    }

    #[test]
    fn inheritance_appends_letters_and_merges_labels() {
        let config = MaterialConfig::builtin().expect("builtin");
        let czeror = config.resolve("czeror").expect("czeror");
        assert_eq!(
            czeror.alphabet().iter().collect::<String>(),
            "CMDVGTSWPYFNXEAR"
        );
        assert_eq!(czeror.label('X'), Some("Grass"));
        assert_eq!(czeror.label('R'), Some("Gravel"));
        assert_eq!(czeror.label('C'), Some("Concrete"));
    }

    #[test]
    fn child_overrides_parent_fields() {
        let config = MaterialConfig::parse_toml(
            r#"
            [games.base]
            materials = "ABC"
            default = "A"
            [games.base.labels]
            A = "Alpha"
            [games.child]
            inherits = "base"
            materials = "CD"
            default = "D"
            [games.child.labels]
            A = "Other"
            "#,
        )
        .expect("parse");
        let child = config.resolve("child").expect("child");
        assert_eq!(child.alphabet(), &['A', 'B', 'C', 'D']);
        assert_eq!(child.default_letter(), 'D');
        assert_eq!(child.label('A'), Some("Other"));
        // resolving the child first leaves the parent untouched
        let base = config.resolve("base").expect("base");
        assert_eq!(base.alphabet(), &['A', 'B', 'C']);
        assert_eq!(base.label('A'), Some("Alpha"));
    }

    #[test]
    fn unknown_game_and_cycles_fail() {
        let config = MaterialConfig::parse_toml(
            r#"
            [games.a]
            inherits = "b"
            [games.b]
            inherits = "a"
            [games.c]
            inherits = "missing"
            "#,
        )
        .expect("parse");
        assert!(matches!(
            config.resolve("nope"),
            Err(ConfigError::UnknownGame(_))
        ));
        let err = config.resolve("a").expect_err("cycle");
        assert!(matches!(&err, ConfigError::InheritanceCycle(cycle) if cycle == "a -> b -> a"));
        assert_eq!(err.to_string(), "game inheritance cycle: a -> b -> a");
        assert!(matches!(
            config.resolve("c"),
            Err(ConfigError::UnknownGame(id)) if id == "missing"
        ));
    }

    #[test]
    fn validates_letters_and_default() {
        let config = MaterialConfig::parse_toml(
            r#"
            [games.lower]
            materials = "ab"
            default = "a"
            [games.nodefault]
            materials = "AB"
            [games.outside]
            materials = "AB"
            default = "Z"
            "#,
        )
        .expect("parse");
        assert!(matches!(
            config.resolve("lower"),
            Err(ConfigError::InvalidLetter { .. })
        ));
        assert!(matches!(
            config.resolve("nodefault"),
            Err(ConfigError::MissingDefault(_))
        ));
        assert!(matches!(
            config.resolve("outside"),
            Err(ConfigError::DefaultNotInAlphabet { letter: 'Z', .. })
        ));
    }

    #[test]
    fn merge_replaces_games() {
        let mut config = MaterialConfig::builtin().expect("builtin");
        let user = MaterialConfig::parse_toml(
            r#"
            [games.valve]
            materials = "CM"
            default = "M"
            [games.mymod]
            inherits = "valve"
            materials = "Q"
            "#,
        )
        .expect("parse");
        config.merge(user);
        let mymod = config.resolve("mymod").expect("mymod");
        assert_eq!(mymod.alphabet(), &['C', 'M', 'Q']);
        assert_eq!(mymod.default_letter(), 'M');
        assert!(config.contains_game("czero"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MaterialConfig::parse_toml("[games.valve]\nmaterial = \"C\"\n").expect_err("key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
