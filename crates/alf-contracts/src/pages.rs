use std::fmt;

use crate::themes::ThemeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Prompt,
    Generating,
    Result,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Prompt, Stage::Generating, Stage::Result];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prompt => "prompt",
            Stage::Generating => "generating",
            Stage::Result => "result",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == raw)
    }
}

/// Where the user currently is. Friend pages carry the theme id; whether that
/// id exists is decided by the catalog, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Page {
    #[default]
    Landing,
    FriendsMenu,
    Solo(Stage),
    Friend {
        theme: ThemeId,
        stage: Stage,
    },
}

impl Page {
    pub fn key(&self) -> String {
        match self {
            Page::Landing => "landing".to_string(),
            Page::FriendsMenu => "friends".to_string(),
            Page::Solo(stage) => stage.as_str().to_string(),
            Page::Friend { theme, stage } => format!("{}_{}", theme, stage.as_str()),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "landing" => return Some(Page::Landing),
            "friends" => return Some(Page::FriendsMenu),
            _ => {}
        }
        if let Some(stage) = Stage::parse(raw) {
            return Some(Page::Solo(stage));
        }
        let (theme, stage) = raw.rsplit_once('_')?;
        let stage = Stage::parse(stage)?;
        if theme.is_empty() {
            return None;
        }
        Some(Page::Friend {
            theme: ThemeId::from(theme),
            stage,
        })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Page::Solo(stage) | Page::Friend { stage, .. } => Some(*stage),
            Page::Landing | Page::FriendsMenu => None,
        }
    }

    pub fn friend(&self) -> Option<&ThemeId> {
        match self {
            Page::Friend { theme, .. } => Some(theme),
            _ => None,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, Stage};
    use crate::themes::ThemeId;

    #[test]
    fn keys_match_legacy_page_names() {
        assert_eq!(Page::Landing.key(), "landing");
        assert_eq!(Page::FriendsMenu.key(), "friends");
        assert_eq!(Page::Solo(Stage::Generating).key(), "generating");
        assert_eq!(
            Page::Friend {
                theme: ThemeId::from("polly"),
                stage: Stage::Result,
            }
            .key(),
            "polly_result"
        );
    }

    #[test]
    fn parse_inverts_key() {
        for raw in ["landing", "friends", "prompt", "result", "pepe_generating"] {
            let page = Page::parse(raw).unwrap();
            assert_eq!(page.key(), raw);
        }
    }

    #[test]
    fn parse_keeps_underscores_in_theme_ids() {
        assert_eq!(
            Page::parse("land_wolf_prompt"),
            Some(Page::Friend {
                theme: ThemeId::from("land_wolf"),
                stage: Stage::Prompt,
            })
        );
    }

    #[test]
    fn parse_rejects_unknown_shapes() {
        assert_eq!(Page::parse(""), None);
        assert_eq!(Page::parse("_prompt"), None);
        assert_eq!(Page::parse("pepe_dancing"), None);
        assert_eq!(Page::parse("Landing"), None);
    }
}
