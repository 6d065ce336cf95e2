use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alf_contracts::prompts::truncate_text;
use alf_contracts::Bitmap;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::config::StudioConfig;
use crate::error::{EngineError, GenerationError};
use crate::export::image_to_png_bytes;

pub const MAX_EDIT_REFERENCES: usize = 16;
const ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub struct GenerateRequest {
    /// Sent verbatim; framing happens before the provider is called.
    pub prompt: String,
    pub references: Vec<Bitmap>,
    /// Session-scoped key, preferred over the configured one.
    pub api_key: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            references: Vec::new(),
            api_key: None,
        }
    }
}

#[derive(Clone)]
pub struct GenerateResponse {
    pub image: Bitmap,
    pub prompt: String,
}

impl fmt::Debug for GenerateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateResponse")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("prompt", &self.prompt)
            .finish()
    }
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, EngineError>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn ImageProvider>> {
        self.providers.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &StudioConfig) -> Result<ImageProviderRegistry> {
    let mut registry = ImageProviderRegistry::new();
    registry.register(DryrunProvider::new(&config.size));
    registry.register(OpenAiProvider::new(config)?);
    Ok(registry)
}

/// Offline stand-in: a flat image whose color is a hash of the prompt.
pub struct DryrunProvider {
    width: u32,
    height: u32,
}

impl DryrunProvider {
    pub fn new(size: &str) -> Self {
        let (width, height) = parse_dims(size);
        Self { width, height }
    }
}

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, EngineError> {
        let (r, g, b) = color_from_prompt(&request.prompt, request.references.len() as u64);
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([r, g, b]));
        log::debug!(
            "dryrun image {}x{} with {} references",
            self.width,
            self.height,
            request.references.len()
        );
        Ok(GenerateResponse {
            image: Arc::new(DynamicImage::ImageRgb8(image)),
            prompt: request.prompt.clone(),
        })
    }
}

pub struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    model: String,
    size: String,
    quality: String,
    n: u32,
    input_fidelity: String,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(config: &StudioConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            size: config.size.clone(),
            quality: config.quality.clone(),
            n: config.n.max(1),
            input_fidelity: config.input_fidelity.clone(),
            http,
        })
    }

    fn resolve_api_key(&self, request: &GenerateRequest) -> Option<String> {
        request
            .api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn generation_payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "size": self.size,
            "quality": self.quality,
            "n": self.n,
        })
    }

    fn generate_images(
        &self,
        request: &GenerateRequest,
        api_key: &str,
    ) -> Result<GenerateResponse, EngineError> {
        let endpoint = format!("{}/images/generations", self.api_base);
        let payload = self.generation_payload(&request.prompt);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .map_err(|err| {
                GenerationError::Api(format!("OpenAI request failed ({endpoint}): {err}"))
            })?;
        let response_payload = response_json_or_error("OpenAI", response)?;
        let image = decode_first_image(&response_payload)?;
        Ok(GenerateResponse {
            image: Arc::new(image),
            prompt: request.prompt.clone(),
        })
    }

    /// Multipart body for `/images/edits` plus a JSON manifest of what went in.
    fn edit_form(&self, request: &GenerateRequest) -> Result<(MultipartForm, Map<String, Value>)> {
        let mut form = MultipartForm::new()
            .text("model", self.model.clone())
            .text("prompt", request.prompt.clone())
            .text("size", self.size.clone())
            .text("quality", self.quality.clone())
            .text("input_fidelity", self.input_fidelity.clone());
        let mut manifest = Map::new();
        manifest.insert("model".to_string(), json!(self.model));
        manifest.insert("prompt".to_string(), json!(request.prompt));
        manifest.insert("size".to_string(), json!(self.size));
        manifest.insert("quality".to_string(), json!(self.quality));
        manifest.insert("input_fidelity".to_string(), json!(self.input_fidelity));

        if request.references.len() > MAX_EDIT_REFERENCES {
            log::warn!(
                "sending first {MAX_EDIT_REFERENCES} of {} reference images",
                request.references.len()
            );
        }
        let mut files = Vec::new();
        for (idx, reference) in request
            .references
            .iter()
            .take(MAX_EDIT_REFERENCES)
            .enumerate()
        {
            let file_name = format!("reference_{idx}.png");
            let bytes = image_to_png_bytes(reference)
                .with_context(|| format!("failed encoding {file_name}"))?;
            let part = MultipartPart::bytes(bytes)
                .file_name(file_name.clone())
                .mime_str("image/png")
                .with_context(|| format!("invalid mime for {file_name}"))?;
            form = form.part("image[]", part);
            files.push(json!({ "field": "image[]", "file_name": file_name }));
        }
        manifest.insert("files".to_string(), Value::Array(files));
        Ok((form, manifest))
    }

    fn edit_images(
        &self,
        request: &GenerateRequest,
        api_key: &str,
    ) -> Result<GenerateResponse, EngineError> {
        let endpoint = format!("{}/images/edits", self.api_base);
        let (form, manifest) = self.edit_form(request)?;
        let file_count = manifest
            .get("files")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        log::debug!("POST {endpoint} with {file_count} reference files");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .map_err(|err| GenerationError::Api(format!("OpenAI edits request failed: {err}")))?;
        let response_payload = response_json_or_error("OpenAI edits", response)?;
        let image = decode_first_image(&response_payload)?;
        Ok(GenerateResponse {
            image: Arc::new(image),
            prompt: request.prompt.clone(),
        })
    }
}

impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, EngineError> {
        let Some(api_key) = self.resolve_api_key(request) else {
            return Err(anyhow!("OpenAI API key not set (use /key or OPENAI_API_KEY)").into());
        };
        if request.references.is_empty() {
            return self.generate_images(request, &api_key);
        }
        self.edit_images(request, &api_key)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, GenerationError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| GenerationError::Api(format!("{provider} response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(GenerationError::Api(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, ERROR_BODY_CHARS)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        GenerationError::MalformedResponse(format!("{provider} returned invalid JSON: {err}"))
    })
}

fn decode_first_image(payload: &Value) -> Result<DynamicImage, GenerationError> {
    let first = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or(GenerationError::NoImages)?;
    let b64 = first
        .get("b64_json")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            GenerationError::MalformedResponse(
                "No base64 image data found in API response".to_string(),
            )
        })?;
    let bytes = BASE64.decode(b64.as_bytes()).map_err(|err| {
        GenerationError::MalformedResponse(format!("image base64 decode failed: {err}"))
    })?;
    image::load_from_memory(&bytes)
        .map_err(|err| GenerationError::MalformedResponse(format!("image decode failed: {err}")))
}

fn parse_dims(size: &str) -> (u32, u32) {
    size.split_once('x')
        .and_then(|(w, h)| {
            let width = w.trim().parse::<u32>().ok()?;
            let height = h.trim().parse::<u32>().ok()?;
            Some((width, height))
        })
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or((1024, 1024))
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
