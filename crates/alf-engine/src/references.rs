use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alf_contracts::{LoadedReference, ReferenceSource, ThemeId};
use anyhow::{Context, Result};
use image::DynamicImage;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// On-disk reference pools. The mascot's images sit loose in the root and
/// every friend gets a subdirectory named after its id.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    root: PathBuf,
    mascot: ThemeId,
}

#[derive(Default)]
pub struct ReferenceLoad {
    pub images: Vec<LoadedReference>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    pub folder: PathBuf,
    pub folder_exists: bool,
    pub image_files: Vec<String>,
    pub error: Option<String>,
}

impl ReferenceInfo {
    pub fn image_count(&self) -> usize {
        self.image_files.len()
    }
}

impl ReferenceStore {
    pub fn new(root: impl Into<PathBuf>, mascot: ThemeId) -> Self {
        Self {
            root: root.into(),
            mascot,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_for(&self, theme: &ThemeId) -> PathBuf {
        if theme == &self.mascot {
            return self.root.clone();
        }
        self.root.join(theme.as_str())
    }

    /// Reads every supported image in the theme's folder, in file name order.
    /// Files that fail to decode are skipped and reported in `warnings`.
    pub fn load(&self, theme: &ThemeId) -> ReferenceLoad {
        let folder = self.folder_for(theme);
        let mut out = ReferenceLoad::default();
        if !folder.is_dir() {
            log::info!("no reference folder for {theme} at {}", folder.display());
            return out;
        }

        let names = match list_image_files(&folder) {
            Ok(names) => names,
            Err(err) => {
                let message = format!("{err:#}");
                log::warn!("{message}");
                out.warnings.push(message);
                return out;
            }
        };

        for name in names {
            let path = folder.join(&name);
            match decode_rgb(&path) {
                Ok(image) => out.images.push(LoadedReference {
                    image: Arc::new(image),
                    file_name: name,
                }),
                Err(err) => {
                    let message = format!("Could not load reference image {name}: {err:#}");
                    log::warn!("{message}");
                    out.warnings.push(message);
                }
            }
        }
        log::debug!(
            "loaded {} reference images for {theme} from {}",
            out.images.len(),
            folder.display()
        );
        out
    }

    pub fn info(&self, theme: &ThemeId) -> ReferenceInfo {
        let folder = self.folder_for(theme);
        if !folder.is_dir() {
            return ReferenceInfo {
                folder,
                folder_exists: false,
                image_files: Vec::new(),
                error: None,
            };
        }
        match list_image_files(&folder) {
            Ok(image_files) => ReferenceInfo {
                folder,
                folder_exists: true,
                image_files,
                error: None,
            },
            Err(err) => ReferenceInfo {
                folder,
                folder_exists: true,
                image_files: Vec::new(),
                error: Some(format!("{err:#}")),
            },
        }
    }
}

impl ReferenceSource for ReferenceStore {
    fn load_reference_images(&self, theme: &ThemeId) -> Vec<LoadedReference> {
        self.load(theme).images
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn list_image_files(folder: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Error accessing references folder {}", folder.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed listing {}", folder.display()))?;
        let path = entry.path();
        if !path.is_file() || !is_supported_image(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|value| value.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn decode_rgb(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path).with_context(|| format!("failed decoding {}", path.display()))?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use alf_contracts::{ReferenceSource, Session, ThemeCatalog, ThemeId};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::ReferenceStore;

    fn write_png(path: &Path, shade: u8) -> anyhow::Result<()> {
        RgbImage::from_pixel(4, 4, Rgb([shade, 0, 0])).save(path)?;
        Ok(())
    }

    fn store(root: &Path) -> ReferenceStore {
        ReferenceStore::new(root, ThemeId::from("alf"))
    }

    #[test]
    fn mascot_reads_root_and_friends_read_subfolders() {
        let store = store(Path::new("/refs"));
        assert_eq!(store.folder_for(&ThemeId::from("alf")), Path::new("/refs"));
        assert_eq!(
            store.folder_for(&ThemeId::from("pepe")),
            Path::new("/refs/pepe")
        );
    }

    #[test]
    fn corrupt_file_is_skipped_with_a_warning() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        for idx in 0..7u8 {
            write_png(&temp.path().join(format!("alf-{idx}.png")), idx * 10)?;
        }
        fs::write(temp.path().join("broken.png"), b"definitely not a png")?;

        let load = store(temp.path()).load(&ThemeId::from("alf"));
        assert_eq!(load.images.len(), 7);
        assert_eq!(load.warnings.len(), 1);
        assert!(load.warnings[0].contains("broken.png"));
        Ok(())
    }

    #[test]
    fn session_folder_load_counts_only_readable_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        for idx in 0..7u8 {
            write_png(&temp.path().join(format!("alf-{idx}.png")), idx)?;
        }
        fs::write(temp.path().join("broken.jpg"), b"garbage")?;

        let mut session = Session::new(std::sync::Arc::new(ThemeCatalog::bundled()?));
        let count = session.load_reference_images_from_folder(&store(temp.path()), "alf");
        assert_eq!(count, 7);
        assert_eq!(session.get_reference_images("alf").len(), 5);
        Ok(())
    }

    #[test]
    fn loading_is_flat_filtered_and_converts_to_rgb() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let pepe = temp.path().join("pepe");
        fs::create_dir_all(pepe.join("nested"))?;
        RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4])).save(pepe.join("b.png"))?;
        write_png(&pepe.join("a.bmp"), 9)?;
        write_png(&pepe.join("nested").join("deep.png"), 9)?;
        fs::write(pepe.join("notes.txt"), "not an image")?;

        let store = store(temp.path());
        let loaded = store.load_reference_images(&ThemeId::from("pepe"));
        let names: Vec<&str> = loaded.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.bmp", "b.png"]);
        assert!(loaded.iter().all(|r| r.image.as_rgb8().is_some()));

        let info = store.info(&ThemeId::from("pepe"));
        assert!(info.folder_exists);
        assert_eq!(info.image_count(), 2);
        Ok(())
    }

    #[test]
    fn missing_folder_loads_nothing() {
        let store = store(Path::new("/definitely/not/here"));
        let load = store.load(&ThemeId::from("polly"));
        assert!(load.images.is_empty());
        assert!(load.warnings.is_empty());
        assert!(!store.info(&ThemeId::from("polly")).folder_exists);
    }
}
