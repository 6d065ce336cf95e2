use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use uuid::Uuid;

use crate::error::SessionError;
use crate::pages::{Page, Stage};
use crate::queue::BoundedQueue;
use crate::themes::{ThemeCatalog, ThemeId};

pub const HISTORY_LIMIT: usize = 10;
pub const REFERENCE_LIMIT: usize = 5;

/// Shared handle to a decoded image. Cloning never copies pixels, so identity
/// can be checked with `Arc::ptr_eq`.
pub type Bitmap = Arc<DynamicImage>;

#[derive(Clone)]
pub struct GeneratedArtifact {
    pub prompt: String,
    pub image: Bitmap,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for GeneratedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedArtifact")
            .field("prompt", &self.prompt)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct LoadedReference {
    pub image: Bitmap,
    pub file_name: String,
}

/// File-store collaborator behind `load_reference_images_from_folder`.
/// Loading is total: unreadable files are skipped by the implementation.
pub trait ReferenceSource {
    fn load_reference_images(&self, theme: &ThemeId) -> Vec<LoadedReference>;
}

/// All mutable state for one visitor. Nothing here is shared across sessions.
pub struct Session {
    id: Uuid,
    catalog: Arc<ThemeCatalog>,
    current_page: Page,
    current_prompt: String,
    generated_image: Option<Bitmap>,
    history: BoundedQueue<GeneratedArtifact>,
    reference_images: BTreeMap<ThemeId, BoundedQueue<Bitmap>>,
    api_key: Option<String>,
}

impl Session {
    pub fn new(catalog: Arc<ThemeCatalog>) -> Self {
        Self::with_id(Uuid::new_v4(), catalog)
    }

    fn with_id(id: Uuid, catalog: Arc<ThemeCatalog>) -> Self {
        Self {
            id,
            catalog,
            current_page: Page::Landing,
            current_prompt: String::new(),
            generated_image: None,
            history: BoundedQueue::new(HISTORY_LIMIT),
            reference_images: BTreeMap::new(),
            api_key: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn catalog(&self) -> &Arc<ThemeCatalog> {
        &self.catalog
    }

    pub fn get_current_page(&self) -> &Page {
        &self.current_page
    }

    pub fn set_page(&mut self, page: Page) -> Result<(), SessionError> {
        if !self.catalog.contains_page(&page) {
            return Err(SessionError::InvalidPage(page.key()));
        }
        if self.current_page != page {
            log::debug!("session {}: {} -> {}", self.id, self.current_page, page);
            self.current_page = page;
        }
        Ok(())
    }

    pub fn set_page_key(&mut self, key: &str) -> Result<(), SessionError> {
        let page = Page::parse(key).ok_or_else(|| SessionError::InvalidPage(key.to_string()))?;
        self.set_page(page)
    }

    /// Current page, forced back to landing if it is no longer in the catalog.
    pub fn resolve_page(&mut self) -> Page {
        if !self.catalog.contains_page(&self.current_page) {
            log::warn!(
                "session {}: unknown page '{}', falling back to landing",
                self.id,
                self.current_page
            );
            self.current_page = Page::Landing;
        }
        self.current_page.clone()
    }

    pub fn navigate(&mut self, theme: &str, stage: Stage) -> Result<(), SessionError> {
        let page = self
            .catalog
            .page_for(theme, stage)
            .map_err(|_| SessionError::InvalidPage(format!("{theme}_{}", stage.as_str())))?;
        self.set_page(page)
    }

    pub fn navigate_to_landing(&mut self) {
        self.current_page = Page::Landing;
    }

    pub fn navigate_to_friends(&mut self) {
        self.current_page = Page::FriendsMenu;
    }

    pub fn navigate_to_prompt(&mut self) {
        self.current_page = Page::Solo(Stage::Prompt);
    }

    pub fn navigate_to_generating(&mut self) {
        self.current_page = Page::Solo(Stage::Generating);
    }

    pub fn navigate_to_result(&mut self) {
        self.current_page = Page::Solo(Stage::Result);
    }

    pub fn get_current_prompt(&self) -> &str {
        &self.current_prompt
    }

    pub fn set_current_prompt(&mut self, text: impl Into<String>) {
        self.current_prompt = text.into();
    }

    pub fn has_prompt(&self) -> bool {
        !self.current_prompt.trim().is_empty()
    }

    pub fn get_generated_image(&self) -> Option<&Bitmap> {
        self.generated_image.as_ref()
    }

    pub fn set_generated_image(&mut self, image: Option<Bitmap>) {
        self.generated_image = image;
    }

    pub fn has_generated_image(&self) -> bool {
        self.generated_image.is_some()
    }

    pub fn add_to_history(&mut self, prompt: impl Into<String>, image: Bitmap) {
        self.history.push(GeneratedArtifact {
            prompt: prompt.into(),
            image,
            created_at: Utc::now(),
        });
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<GeneratedArtifact> {
        self.history.to_vec()
    }

    pub fn get_reference_images(&self, theme: &str) -> Vec<Bitmap> {
        self.reference_images
            .get(theme)
            .map(BoundedQueue::to_vec)
            .unwrap_or_default()
    }

    pub fn add_reference_image(&mut self, theme: &str, image: Bitmap) {
        self.reference_images
            .entry(ThemeId::from(theme))
            .or_insert_with(|| BoundedQueue::new(REFERENCE_LIMIT))
            .push(image);
    }

    pub fn clear_reference_images(&mut self, theme: &str) {
        self.reference_images.remove(theme);
    }

    pub fn has_reference_images(&self, theme: &str) -> bool {
        self.reference_images
            .get(theme)
            .map(|queue| !queue.is_empty())
            .unwrap_or(false)
    }

    /// Replaces the cache for `theme` with whatever the folder holds now and
    /// returns how many images were read. Only the newest `REFERENCE_LIMIT`
    /// stay cached.
    pub fn load_reference_images_from_folder(
        &mut self,
        source: &dyn ReferenceSource,
        theme: &str,
    ) -> usize {
        let theme = ThemeId::from(theme);
        let loaded = source.load_reference_images(&theme);
        let count = loaded.len();
        let mut cache = BoundedQueue::new(REFERENCE_LIMIT);
        cache.replace_with(loaded.into_iter().map(|reference| reference.image));
        if count > cache.len() {
            log::info!(
                "session {}: {} references found for {}, keeping newest {}",
                self.id,
                count,
                theme,
                cache.len()
            );
        }
        self.reference_images.insert(theme, cache);
        count
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, key: Option<String>) {
        self.api_key = key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Wipes prompt, image, history, reference caches and API key. The
    /// current page survives, even when it is a result page whose image is
    /// now gone.
    pub fn clear_session(&mut self) {
        let page = self.current_page.clone();
        *self = Self::with_id(self.id, Arc::clone(&self.catalog));
        self.current_page = page;
    }

    pub fn reset_to_landing(&mut self) {
        self.clear_session();
        self.current_page = Page::Landing;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{DynamicImage, RgbImage};

    use super::*;

    fn catalog() -> Arc<ThemeCatalog> {
        Arc::new(ThemeCatalog::bundled().expect("bundled catalog"))
    }

    fn bitmap(shade: u8) -> Bitmap {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            image::Rgb([shade, shade, shade]),
        )))
    }

    struct FixedSource {
        count: usize,
    }

    impl ReferenceSource for FixedSource {
        fn load_reference_images(&self, _theme: &ThemeId) -> Vec<LoadedReference> {
            (0..self.count)
                .map(|idx| LoadedReference {
                    image: bitmap(idx as u8),
                    file_name: format!("ref-{idx}.png"),
                })
                .collect()
        }
    }

    #[test]
    fn starts_on_landing_with_empty_state() {
        let session = Session::new(catalog());
        assert_eq!(session.get_current_page(), &Page::Landing);
        assert_eq!(session.get_current_prompt(), "");
        assert!(!session.has_generated_image());
        assert!(session.history().is_empty());
        assert!(session.get_reference_images("alf").is_empty());
    }

    #[test]
    fn set_page_accepts_every_page_in_the_set() {
        let catalog = catalog();
        let mut session = Session::new(Arc::clone(&catalog));
        for page in catalog.pages() {
            session.set_page(page.clone()).unwrap();
            assert_eq!(session.get_current_page(), &page);
            session.set_page(page.clone()).unwrap();
            assert_eq!(session.get_current_page(), &page);
        }
    }

    #[test]
    fn invalid_page_fails_and_keeps_current_page() {
        let mut session = Session::new(catalog());
        session.navigate_to_friends();
        let err = session
            .set_page(Page::Friend {
                theme: ThemeId::from("kermit"),
                stage: Stage::Prompt,
            })
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidPage("kermit_prompt".to_string()));
        assert_eq!(session.get_current_page(), &Page::FriendsMenu);

        assert!(session.set_page_key("nowhere").is_err());
        assert!(session.navigate("kermit", Stage::Result).is_err());
        assert_eq!(session.get_current_page(), &Page::FriendsMenu);

        session.set_page_key("pepe_result").unwrap();
        assert_eq!(session.get_current_page().key(), "pepe_result");
    }

    #[test]
    fn resolve_page_falls_back_to_landing_for_unknown_friend() {
        let mut session = Session::new(catalog());
        session.current_page = Page::Friend {
            theme: ThemeId::from("kermit"),
            stage: Stage::Result,
        };

        assert_eq!(session.resolve_page(), Page::Landing);
        assert_eq!(session.get_current_page(), &Page::Landing);

        session.navigate("pepe", Stage::Generating).unwrap();
        assert_eq!(session.resolve_page().key(), "pepe_generating");
    }

    #[test]
    fn history_keeps_ten_most_recent_in_order() {
        let mut session = Session::new(catalog());
        for idx in 0..23 {
            session.add_to_history(format!("prompt {idx}"), bitmap(idx as u8));
            assert!(session.history().len() <= HISTORY_LIMIT);
        }
        let prompts: Vec<String> = session
            .history()
            .into_iter()
            .map(|entry| entry.prompt)
            .collect();
        let expected: Vec<String> = (13..23).map(|idx| format!("prompt {idx}")).collect();
        assert_eq!(prompts, expected);
    }

    #[test]
    fn sixth_reference_evicts_the_first() {
        let mut session = Session::new(catalog());
        let images: Vec<Bitmap> = (1..=6).map(bitmap).collect();
        for image in &images {
            session.add_reference_image("pepe", Arc::clone(image));
        }
        let cached = session.get_reference_images("pepe");
        assert_eq!(cached.len(), REFERENCE_LIMIT);
        for (held, expected) in cached.iter().zip(images[1..].iter()) {
            assert!(Arc::ptr_eq(held, expected));
        }
        assert!(session.get_reference_images("polly").is_empty());
    }

    #[test]
    fn clear_session_keeps_page_and_wipes_everything_else() {
        let mut session = Session::new(catalog());
        session.navigate("polly", Stage::Result).unwrap();
        session.set_current_prompt("ALF and Polly on an iceberg");
        session.set_generated_image(Some(bitmap(1)));
        session.add_to_history("ALF and Polly on an iceberg", bitmap(1));
        session.add_reference_image("alf", bitmap(2));
        session.add_reference_image("polly", bitmap(3));
        session.set_api_key(Some("sk-test".to_string()));
        let id = session.id();
        let before = session.get_current_page().clone();

        session.clear_session();

        assert_eq!(session.get_current_page(), &before);
        assert_eq!(session.get_current_prompt(), "");
        assert!(session.get_generated_image().is_none());
        assert!(session.history().is_empty());
        assert!(!session.has_reference_images("alf"));
        assert!(!session.has_reference_images("polly"));
        assert!(!session.has_api_key());
        assert_eq!(session.id(), id);
    }

    #[test]
    fn reset_to_landing_clears_and_moves_home() {
        let mut session = Session::new(catalog());
        session.navigate("god", Stage::Generating).unwrap();
        session.set_current_prompt("letters everywhere");
        session.reset_to_landing();
        assert_eq!(session.get_current_page(), &Page::Landing);
        assert!(!session.has_prompt());
    }

    #[test]
    fn solo_generation_round_trip() {
        let mut session = Session::new(catalog());
        session.navigate_to_prompt();
        assert_eq!(session.get_current_page(), &Page::Solo(Stage::Prompt));

        session.set_current_prompt("ALF floating in a cosmic swamp");
        assert_eq!(session.get_current_prompt(), "ALF floating in a cosmic swamp");

        let img = bitmap(7);
        let prompt = session.get_current_prompt().to_string();
        session.add_to_history(prompt, Arc::clone(&img));
        session.set_generated_image(Some(Arc::clone(&img)));
        session.navigate_to_result();

        assert_eq!(session.get_current_page(), &Page::Solo(Stage::Result));
        assert!(Arc::ptr_eq(session.get_generated_image().unwrap(), &img));
    }

    #[test]
    fn folder_load_replaces_cache_and_reports_full_count() {
        let mut session = Session::new(catalog());
        session.add_reference_image("alf", bitmap(200));
        let count = session.load_reference_images_from_folder(&FixedSource { count: 7 }, "alf");
        assert_eq!(count, 7);
        let cached = session.get_reference_images("alf");
        assert_eq!(cached.len(), REFERENCE_LIMIT);
        assert!(cached.iter().all(|image| image.as_rgb8().unwrap()[(0, 0)][0] < 7));

        let count = session.load_reference_images_from_folder(&FixedSource { count: 0 }, "alf");
        assert_eq!(count, 0);
        assert!(!session.has_reference_images("alf"));
    }

    #[test]
    fn api_key_is_trimmed_and_blank_is_none() {
        let mut session = Session::new(catalog());
        session.set_api_key(Some("   ".to_string()));
        assert!(!session.has_api_key());
        session.set_api_key(Some(" sk-abc ".to_string()));
        assert_eq!(session.api_key(), Some("sk-abc"));
    }
}
