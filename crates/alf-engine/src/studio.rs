use std::fmt;
use std::sync::Arc;

use alf_contracts::{Bitmap, PromptEngine, Session, Stage, ThemeCatalog, ThemeId};
use anyhow::{anyhow, Context, Result};

use crate::config::StudioConfig;
use crate::error::EngineError;
use crate::providers::{default_provider_registry, GenerateRequest, ImageProvider};
use crate::references::{ReferenceLoad, ReferenceStore};

#[derive(Clone)]
pub struct GenerationOutcome {
    pub image: Bitmap,
    pub prompt_sent: String,
    pub reference_count: usize,
}

impl fmt::Debug for GenerationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationOutcome")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("prompt_sent", &self.prompt_sent)
            .field("reference_count", &self.reference_count)
            .finish()
    }
}

/// Runs generations against a session: gathers references, frames the
/// prompt, calls the provider and records the result.
pub struct Studio {
    catalog: Arc<ThemeCatalog>,
    prompts: PromptEngine,
    provider: Box<dyn ImageProvider>,
    references: ReferenceStore,
}

impl Studio {
    pub fn new(
        catalog: Arc<ThemeCatalog>,
        provider: Box<dyn ImageProvider>,
        references: ReferenceStore,
    ) -> Self {
        Self {
            prompts: PromptEngine::new(Arc::clone(&catalog)),
            catalog,
            provider,
            references,
        }
    }

    pub fn from_config(config: &StudioConfig, catalog: Arc<ThemeCatalog>) -> Result<Self> {
        let mut registry = default_provider_registry(config)?;
        let known = registry.names().join(", ");
        let provider = registry
            .take(&config.provider)
            .with_context(|| format!("unknown provider '{}' (known: {known})", config.provider))?;
        let references =
            ReferenceStore::new(config.references_dir.clone(), catalog.mascot_id().clone());
        log::info!(
            "studio using provider {} with references in {}",
            provider.name(),
            references.root().display()
        );
        Ok(Self::new(catalog, provider, references))
    }

    pub fn catalog(&self) -> &Arc<ThemeCatalog> {
        &self.catalog
    }

    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    /// Mascot references first, then the friend's own pool.
    pub fn references_for(&self, session: &Session, theme: &str) -> Vec<Bitmap> {
        let mascot = self.catalog.mascot_id().as_str();
        let mut out = session.get_reference_images(mascot);
        if theme != mascot {
            out.extend(session.get_reference_images(theme));
        }
        out
    }

    /// One generation for `theme` from the session's current prompt. The
    /// session is only touched when the provider succeeds.
    pub fn generate(
        &self,
        session: &mut Session,
        theme: &str,
    ) -> Result<GenerationOutcome, EngineError> {
        let user_prompt = session.get_current_prompt().trim().to_string();
        if user_prompt.is_empty() {
            return Err(anyhow!("no prompt to generate from").into());
        }
        let result_page = self
            .catalog
            .page_for(theme, Stage::Result)
            .map_err(anyhow::Error::from)?;

        let references = self.references_for(session, theme);
        let prompt = self
            .prompts
            .final_prompt(&user_prompt, theme, !references.is_empty())
            .map_err(anyhow::Error::from)?;
        let reference_count = references.len();
        log::info!(
            "session {}: generating {theme} via {} with {reference_count} references",
            session.id(),
            self.provider.name()
        );

        let request = GenerateRequest {
            prompt,
            references,
            api_key: session.api_key().map(str::to_string),
        };
        let response = self.provider.generate(&request)?;

        // Page first: it is the only step that can still fail.
        session.set_page(result_page).map_err(anyhow::Error::from)?;
        session.add_to_history(user_prompt, Arc::clone(&response.image));
        session.set_generated_image(Some(Arc::clone(&response.image)));
        Ok(GenerationOutcome {
            image: response.image,
            prompt_sent: response.prompt,
            reference_count,
        })
    }

    /// Replaces one theme's cached references from disk.
    pub fn reload_references(&self, session: &mut Session, theme: &str) -> ReferenceLoad {
        let id = ThemeId::from(theme);
        let load = self.references.load(&id);
        session.clear_reference_images(theme);
        for reference in &load.images {
            session.add_reference_image(theme, Arc::clone(&reference.image));
        }
        load
    }

    pub fn load_all_references(&self, session: &mut Session) -> Vec<(ThemeId, usize)> {
        self.catalog
            .ids()
            .into_iter()
            .map(|id| {
                let count = session.load_reference_images_from_folder(&self.references, id.as_str());
                log::debug!("{count} reference images for {id}");
                (id, count)
            })
            .collect()
    }
}
