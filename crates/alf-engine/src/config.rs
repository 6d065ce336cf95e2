use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-image-1";

/// Settings shared by every generation in a studio run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub n: u32,
    pub input_fidelity: String,
    pub provider: String,
    pub references_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            size: "1024x1024".to_string(),
            quality: "high".to_string(),
            n: 1,
            input_fidelity: "high".to_string(),
            provider: "openai".to_string(),
            references_dir: PathBuf::from("references"),
            output_dir: PathBuf::from("."),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(base) = lookup("OPENAI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        config.api_key = lookup("OPENAI_API_KEY");
        if let Some(model) = lookup("ALF_IMAGE_MODEL") {
            config.model = model;
        }
        if let Some(provider) = lookup("ALF_PROVIDER") {
            config.provider = provider.to_ascii_lowercase();
        }
        if let Some(dir) = lookup("ALF_REFERENCES_DIR") {
            config.references_dir = PathBuf::from(dir);
        }
        config
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
