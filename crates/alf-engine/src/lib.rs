pub mod config;
pub mod error;
pub mod export;
pub mod providers;
pub mod references;
pub mod studio;

pub use config::StudioConfig;
pub use error::{EngineError, GenerationError};
pub use export::{generate_filename, image_to_png_bytes, validate_api_key};
pub use providers::{
    default_provider_registry, GenerateRequest, GenerateResponse, ImageProvider,
    ImageProviderRegistry,
};
pub use references::{ReferenceInfo, ReferenceLoad, ReferenceStore, SUPPORTED_EXTENSIONS};
pub use studio::{GenerationOutcome, Studio};
