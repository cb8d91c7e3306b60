//! The map's entity block: brace-delimited records of `"key" "value"` lines.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::text::{decode_cp1252, encode_cp1252};

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity {entity}, line {line}: unexpected {text:?}")]
    UnexpectedLine {
        entity: usize,
        line: usize,
        text: String,
    },
    #[error("entity {entity} is not terminated")]
    Unterminated { entity: usize },
}

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^"([^"]*)"\s*"([^"]*)"$"#).expect("key/value pattern is valid")
    })
}

/// Ordered key/value record. Keys are unique; insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pairs: Vec<(String, String)>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classname(classname: &str) -> Self {
        let mut entity = Self::new();
        entity.set("classname", classname);
        entity
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value in place, or appends a new pair.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn classname(&self) -> Option<&str> {
        self.get("classname")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityList {
    entities: Vec<Entity>,
}

impl EntityList {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn decode(data: &[u8]) -> Result<Self, EntityError> {
        let text = decode_cp1252(data);
        let text = text.trim_end_matches('\0');

        let mut entities = Vec::new();
        let mut current: Option<Entity> = None;
        for (line_index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let entity_index = entities.len();
            let unexpected = move || EntityError::UnexpectedLine {
                entity: entity_index,
                line: line_index + 1,
                text: line.to_string(),
            };
            match line {
                "{" if current.is_none() => current = Some(Entity::new()),
                "}" if current.is_some() => {
                    if let Some(entity) = current.take() {
                        entities.push(entity);
                    }
                }
                _ => match current.as_mut() {
                    Some(entity) => {
                        let caps = pair_pattern().captures(line).ok_or_else(unexpected)?;
                        entity.set(&caps[1], &caps[2]);
                    }
                    None => return Err(unexpected()),
                },
            }
        }
        if current.is_some() {
            return Err(EntityError::Unterminated {
                entity: entities.len(),
            });
        }
        Ok(Self { entities })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut text = self
            .entities
            .iter()
            .map(|entity| {
                let mut record = String::from("{\n");
                for (key, value) in entity.iter() {
                    record.push_str(&format!("\"{}\" \"{}\"\n", key, value));
                }
                record.push('}');
                record
            })
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');
        let mut bytes = encode_cp1252(&text);
        bytes.push(0);
        bytes
    }

    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|entity| entity.classname() == Some("worldspawn"))
    }

    pub fn by_classname<'a>(&'a self, classname: &'a str) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .iter()
            .filter(move |entity| entity.classname() == Some(classname))
    }

    pub fn by_classname_mut<'a>(
        &'a mut self,
        classname: &'a str,
    ) -> impl Iterator<Item = &'a mut Entity> {
        self.entities
            .iter_mut()
            .filter(move |entity| entity.classname() == Some(classname))
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn remove(&mut self, index: usize) -> Option<Entity> {
        (index < self.entities.len()).then(|| self.entities.remove(index))
    }

    pub fn retain(&mut self, keep: impl FnMut(&Entity) -> bool) {
        self.entities.retain(keep);
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.entities.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntityList {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
