use std::sync::Arc;

use thiserror::Error;

use crate::error::ThemeError;
use crate::themes::ThemeCatalog;

pub const MIN_PROMPT_CHARS: usize = 5;
pub const MAX_PROMPT_CHARS: usize = 500;

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromptIssue {
    #[error("You must speak to summon ALF...")]
    Empty,
    #[error("Prompt too short. Need at least {min} characters.")]
    TooShort { min: usize },
    #[error("Prompt too long. Maximum {max} characters allowed.")]
    TooLong { max: usize },
}

/// Stitches character fragments around a user scene. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    catalog: Arc<ThemeCatalog>,
}

impl PromptEngine {
    pub fn new(catalog: Arc<ThemeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ThemeCatalog {
        &self.catalog
    }

    /// The themed scene for `id`, before framing. The mascot passes the scene
    /// through; friends get both appearances and the pairing instructions.
    pub fn build_prompt(&self, user_text: &str, id: &str) -> Result<String, ThemeError> {
        let scene = scene_text(user_text);
        if self.catalog.is_mascot(id) {
            return Ok(scene.to_string());
        }
        let friend = self
            .catalog
            .friend(id)
            .ok_or_else(|| ThemeError::Unknown(id.to_string()))?;
        let mascot = self.catalog.mascot();

        let mut parts: Vec<String> = vec![
            friend.appearance.trim().to_string(),
            mascot.appearance.trim().to_string(),
        ];
        if let Some(note) = non_blank(friend.mascot_note.as_deref()) {
            parts.push(note.to_string());
        }
        if let Some(instruction) = non_blank(friend.reference_instruction.as_deref()) {
            parts.push(instruction.to_string());
        }
        parts.push(format!(
            "The scene shows {} and {} {}.",
            friend.display_name, mascot.display_name, scene
        ));
        if let Some(style) = non_blank(friend.style_suffix.as_deref()) {
            parts.push(style.to_string());
        }
        Ok(parts.join(" "))
    }

    /// Wraps a scene in the base prefix/suffix sent with every generation.
    pub fn frame(&self, scene: &str, has_references: bool) -> String {
        let framing = self.catalog.framing();
        let mut out = String::new();
        out.push_str(framing.prefix.trim());
        out.push(' ');
        if has_references {
            out.push_str(framing.reference_context.trim());
            out.push(' ');
        }
        out.push_str(scene_text(scene));
        out.push_str(". ");
        out.push_str(framing.suffix.trim());
        out
    }

    pub fn final_prompt(
        &self,
        user_text: &str,
        id: &str,
        has_references: bool,
    ) -> Result<String, ThemeError> {
        let scene = self.build_prompt(user_text, id)?;
        Ok(self.frame(&scene, has_references))
    }
}

pub fn validate_prompt_length(text: &str) -> Result<(), PromptIssue> {
    let len = text.trim().chars().count();
    if len == 0 {
        return Err(PromptIssue::Empty);
    }
    if len < MIN_PROMPT_CHARS {
        return Err(PromptIssue::TooShort {
            min: MIN_PROMPT_CHARS,
        });
    }
    if len > MAX_PROMPT_CHARS {
        return Err(PromptIssue::TooLong {
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(())
}

pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Capitalizes the first letter and makes sure the prompt reads as a sentence.
pub fn format_prompt_display(prompt: &str) -> String {
    let trimmed = prompt.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out: String = first.to_uppercase().collect();
    out.push_str(chars.as_str());
    if !out.ends_with(&['.', '!', '?'][..]) {
        out.push('.');
    }
    out
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| if INVALID_FILENAME_CHARS.contains(&ch) { '_' } else { ch })
        .collect()
}

fn scene_text(text: &str) -> &str {
    text.trim().trim_end_matches('.').trim_end()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
