use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, ThemeError};
use crate::pages::{Page, Stage};

const BUNDLED_THEMES_JSON: &str = include_str!("../resources/themes.json");
const RESERVED_IDS: &[&str] = &["landing", "friends"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeId(String);

impl ThemeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ThemeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for ThemeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One row of the character table.
///
/// The mascot row only needs the display and appearance fields; friend rows
/// also carry the fragments the prompt engine stitches around the user's scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterTheme {
    pub id: ThemeId,
    pub display_name: String,
    pub species: String,
    pub personality: String,
    pub emoji: String,
    pub tagline: String,
    pub title: String,
    pub description: String,
    pub appearance: String,
    #[serde(default)]
    pub mascot_note: Option<String>,
    #[serde(default)]
    pub reference_instruction: Option<String>,
    #[serde(default)]
    pub style_suffix: Option<String>,
}

impl CharacterTheme {
    pub fn label(&self) -> String {
        format!("{} {}", self.emoji, self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framing {
    pub prefix: String,
    pub suffix: String,
    pub reference_context: String,
}

#[derive(Debug, Deserialize)]
struct ThemeDocument {
    mascot: CharacterTheme,
    framing: Framing,
    #[serde(default)]
    friends: Vec<CharacterTheme>,
}

#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    mascot: CharacterTheme,
    framing: Framing,
    friends: IndexMap<ThemeId, CharacterTheme>,
}

impl ThemeCatalog {
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json_str(BUNDLED_THEMES_JSON)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let document: ThemeDocument = serde_json::from_str(raw)?;
        Self::from_parts(document.mascot, document.framing, document.friends)
    }

    pub fn from_parts(
        mascot: CharacterTheme,
        framing: Framing,
        friends: Vec<CharacterTheme>,
    ) -> Result<Self, CatalogError> {
        validate_id(mascot.id.as_str())?;
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(mascot.id.to_string());

        let mut by_id = IndexMap::new();
        for friend in friends {
            validate_id(friend.id.as_str())?;
            if !seen.insert(friend.id.to_string()) {
                return Err(CatalogError::DuplicateId(friend.id.to_string()));
            }
            if is_blank(friend.reference_instruction.as_deref()) {
                return Err(CatalogError::MissingField {
                    id: friend.id.to_string(),
                    field: "reference_instruction",
                });
            }
            if is_blank(friend.style_suffix.as_deref()) {
                return Err(CatalogError::MissingField {
                    id: friend.id.to_string(),
                    field: "style_suffix",
                });
            }
            by_id.insert(friend.id.clone(), friend);
        }

        Ok(Self {
            mascot,
            framing,
            friends: by_id,
        })
    }

    pub fn mascot(&self) -> &CharacterTheme {
        &self.mascot
    }

    pub fn mascot_id(&self) -> &ThemeId {
        &self.mascot.id
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    pub fn is_mascot(&self, id: &str) -> bool {
        self.mascot.id.as_str() == id
    }

    pub fn friend(&self, id: &str) -> Option<&CharacterTheme> {
        self.friends.get(id)
    }

    /// 1-based, in table order.
    pub fn friend_at(&self, position: usize) -> Option<&CharacterTheme> {
        position
            .checked_sub(1)
            .and_then(|idx| self.friends.get_index(idx))
            .map(|(_, theme)| theme)
    }

    pub fn friends(&self) -> impl Iterator<Item = &CharacterTheme> {
        self.friends.values()
    }

    pub fn friend_count(&self) -> usize {
        self.friends.len()
    }

    pub fn get(&self, id: &str) -> Option<&CharacterTheme> {
        if self.is_mascot(id) {
            return Some(&self.mascot);
        }
        self.friend(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Mascot first, then friends in table order.
    pub fn ids(&self) -> Vec<ThemeId> {
        std::iter::once(self.mascot.id.clone())
            .chain(self.friends.keys().cloned())
            .collect()
    }

    pub fn page_for(&self, id: &str, stage: Stage) -> Result<Page, ThemeError> {
        if self.is_mascot(id) {
            return Ok(Page::Solo(stage));
        }
        if self.friends.contains_key(id) {
            return Ok(Page::Friend {
                theme: ThemeId::from(id),
                stage,
            });
        }
        Err(ThemeError::Unknown(id.to_string()))
    }

    pub fn theme_for_page(&self, page: &Page) -> Option<&CharacterTheme> {
        match page {
            Page::Landing | Page::FriendsMenu => None,
            Page::Solo(_) => Some(&self.mascot),
            Page::Friend { theme, .. } => self.friend(theme.as_str()),
        }
    }

    pub fn contains_page(&self, page: &Page) -> bool {
        match page {
            Page::Landing | Page::FriendsMenu | Page::Solo(_) => true,
            Page::Friend { theme, .. } => self.friends.contains_key(theme.as_str()),
        }
    }

    /// The closed page set: landing, the friends menu, and one
    /// prompt/generating/result triple per theme.
    pub fn pages(&self) -> Vec<Page> {
        let mut pages = vec![Page::Landing, Page::FriendsMenu];
        pages.extend(Stage::ALL.iter().map(|stage| Page::Solo(*stage)));
        for id in self.friends.keys() {
            pages.extend(Stage::ALL.iter().map(|stage| Page::Friend {
                theme: id.clone(),
                stage: *stage,
            }));
        }
        pages
    }
}

fn validate_id(id: &str) -> Result<(), CatalogError> {
    let well_formed = !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if !well_formed {
        return Err(CatalogError::InvalidId(id.to_string()));
    }
    if RESERVED_IDS.contains(&id) || Stage::parse(id).is_some() {
        return Err(CatalogError::ReservedId(id.to_string()));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}
