pub mod chat;
pub mod error;
pub mod pages;
pub mod prompts;
pub mod queue;
pub mod session;
pub mod themes;

pub use error::{CatalogError, SessionError, ThemeError};
pub use pages::{Page, Stage};
pub use prompts::{validate_prompt_length, PromptEngine, PromptIssue};
pub use queue::BoundedQueue;
pub use session::{
    Bitmap, GeneratedArtifact, LoadedReference, ReferenceSource, Session, HISTORY_LIMIT,
    REFERENCE_LIMIT,
};
pub use themes::{CharacterTheme, Framing, ThemeCatalog, ThemeId};
