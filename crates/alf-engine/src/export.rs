use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};

const FILENAME_PROMPT_CHARS: usize = 30;

/// Format check only; a key that passes may still be rejected upstream.
pub fn validate_api_key(api_key: &str) -> bool {
    let key = api_key.trim();
    key.starts_with("sk-") && key.chars().count() > 20
}

pub fn image_to_png_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("failed encoding PNG")?;
    Ok(buf.into_inner())
}

/// `alf_<prompt words>_<unix seconds>.png`
pub fn generate_filename(prompt: &str, timestamp: i64) -> String {
    let clean: String = prompt
        .chars()
        .take(FILENAME_PROMPT_CHARS)
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_'))
        .collect();
    let clean = clean.trim_end().replace(' ', "_").to_lowercase();
    format!("alf_{clean}_{timestamp}.png")
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};

    use super::{generate_filename, image_to_png_bytes, validate_api_key};

    #[test]
    fn api_key_needs_prefix_and_length() {
        assert!(validate_api_key("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!validate_api_key("sk-short"));
        assert!(!validate_api_key("pk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!validate_api_key(""));
    }

    #[test]
    fn filename_keeps_first_thirty_clean_chars() {
        assert_eq!(
            generate_filename("ALF floating in a cosmic swamp!!", 1_700_000_000),
            "alf_alf_floating_in_a_cosmic_swamp_1700000000.png"
        );
        assert_eq!(
            generate_filename("What? ALF & Pepe: party time / forever", 42),
            "alf_what_alf__pepe_party_time_42.png"
        );
    }

    #[test]
    fn png_bytes_decode_back() -> anyhow::Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])));
        let bytes = image_to_png_bytes(&image)?;
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        Ok(())
    }
}
