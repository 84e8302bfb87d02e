//! Image resolution and scaling
//!
//! Act images and inline chapter images are looked up in an ordered list of
//! candidate locations. Every candidate goes through [`first_decodable`]: the
//! first path that exists and holds a recognisable image wins, and its pixel
//! dimensions are read so the image can be fitted into its box.

use crate::markup::{escape_string, replace_calls, unescape_string};
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the staging directory for downloaded assets
pub const STAGING_DIR_NAME: &str = "output";

/// Points per pixel at 96 dpi
const POINTS_PER_PIXEL: f64 = 0.75;

/// Act image file names, relative to the base directory; `{n}` is the act number
const ACT_IMAGE_TEMPLATES: [&str; 12] = [
    "Akt{n}.png",
    "{n}. Akt/Akt{n}.png",
    "output/Akt{n}.png",
    "images/Akt{n}.png",
    "akt{n}.png",
    "{n}. akt/akt{n}.png",
    "{n}.png",
    "{n}. Akt/{n}.png",
    "Akt{n}.jpg",
    "{n}. Akt/Akt{n}.jpg",
    "Akt{n}.jpeg",
    "{n}. Akt/Akt{n}.jpeg",
];

/// Act image file names, relative to the staging directory
const STAGED_ACT_IMAGE_TEMPLATES: [&str; 3] = ["Akt{n}.png", "Akt{n}.jpg", "Akt{n}.jpeg"];

/// Maximum size of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitBox {
    pub max_width: u32,
    pub max_height: u32,
}

/// Box for the image on an act page
pub const ACT_IMAGE_BOX: FitBox = FitBox {
    max_width: 400,
    max_height: 500,
};

/// Box for images inside chapter text
pub const INLINE_IMAGE_BOX: FitBox = FitBox {
    max_width: 350,
    max_height: 450,
};

/// Dimensions after fitting into a [`FitBox`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedSize {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// Scale `width` x `height` down to fit `bounds`, keeping the aspect ratio
///
/// Images are never enlarged: an image that already fits keeps a scale of 1.
pub fn fit_within(width: u32, height: u32, bounds: FitBox) -> FittedSize {
    if width == 0 || height == 0 {
        return FittedSize {
            width,
            height,
            scale: 1.0,
        };
    }

    let scale = (bounds.max_width as f64 / width as f64)
        .min(bounds.max_height as f64 / height as f64)
        .min(1.0);

    FittedSize {
        width: (width as f64 * scale).round() as u32,
        height: (height as f64 * scale).round() as u32,
        scale,
    }
}

/// An image file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Canonical absolute path
    pub path: PathBuf,
    /// Natural width in pixels
    pub width: u32,
    /// Natural height in pixels
    pub height: u32,
}

impl ResolvedImage {
    /// Size of this image fitted into `bounds`
    pub fn fitted(&self, bounds: FitBox) -> FittedSize {
        fit_within(self.width, self.height, bounds)
    }

    /// Typst image call for this image, fitted into `bounds`
    pub fn typst_call(&self, bounds: FitBox) -> String {
        format!("{})", self.typst_call_head(bounds))
    }

    /// Opening of a Typst image call without the closing parenthesis
    fn typst_call_head(&self, bounds: FitBox) -> String {
        let size = self.fitted(bounds);
        format!(
            "#image(\"{}\", width: {}pt, height: {}pt",
            escape_string(&self.path.to_string_lossy()),
            size.width as f64 * POINTS_PER_PIXEL,
            size.height as f64 * POINTS_PER_PIXEL
        )
    }
}

/// Return the first candidate that exists and decodes as an image
pub fn first_decodable<I>(candidates: I) -> Option<ResolvedImage>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find_map(|candidate| {
        let resolved = probe(&candidate);
        if resolved.is_none() {
            log::trace!("No image at {}", candidate.display());
        }
        resolved
    })
}

fn probe(path: &Path) -> Option<ResolvedImage> {
    if !path.is_file() {
        return None;
    }

    let reader = image::ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    reader.format()?;

    let size = match imagesize::size(path) {
        Ok(size) => size,
        Err(e) => {
            log::warn!("Could not read dimensions for {}: {}", path.display(), e);
            return None;
        }
    };
    if size.width == 0 || size.height == 0 {
        return None;
    }

    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Some(ResolvedImage {
        path,
        width: u32::try_from(size.width).ok()?,
        height: u32::try_from(size.height).ok()?,
    })
}

/// Locates act images and inline images
#[derive(Debug, Clone)]
pub struct ImageResolver {
    /// Directory that relative image paths are resolved against
    base_dir: PathBuf,
    /// Directory holding downloaded assets
    staging_dir: PathBuf,
}

impl ImageResolver {
    pub fn new(base_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Candidate paths for the image of act `number`, in lookup order
    pub fn act_image_candidates(&self, number: u32) -> Vec<PathBuf> {
        let n = number.to_string();
        let base = ACT_IMAGE_TEMPLATES
            .iter()
            .map(|template| self.base_dir.join(template.replace("{n}", &n)));
        let staged = STAGED_ACT_IMAGE_TEMPLATES
            .iter()
            .map(|template| self.staging_dir.join(template.replace("{n}", &n)));
        base.chain(staged).collect()
    }

    /// Find the image of act `number`
    pub fn find_act_image(&self, number: u32) -> Option<ResolvedImage> {
        let found = first_decodable(self.act_image_candidates(number));
        match &found {
            Some(image) => log::debug!("Act {} image: {}", number, image.path.display()),
            None => log::debug!("No image for act {}", number),
        }
        found
    }

    /// Candidate paths for an inline image reference, in lookup order
    pub fn inline_candidates(&self, declared: &str) -> Vec<PathBuf> {
        let declared_path = Path::new(declared);
        let mut candidates = vec![declared_path.to_path_buf()];
        if let Ok(absolute) = fs::canonicalize(declared_path) {
            candidates.push(absolute);
        }
        candidates.push(self.base_dir.join(declared_path));
        candidates.push(self.base_dir.join(STAGING_DIR_NAME).join(declared_path));
        candidates.push(self.staging_dir.join(declared_path));
        candidates
    }

    /// Resolve an image path declared in chapter text
    pub fn resolve_inline(&self, declared: &str) -> Option<ResolvedImage> {
        if declared.starts_with("http://") || declared.starts_with("https://") {
            return None;
        }
        first_decodable(self.inline_candidates(declared))
    }

    /// Point every resolvable `#image("...")` call at the found file
    ///
    /// Resolved calls get an absolute path and an explicit size fitted into
    /// [`INLINE_IMAGE_BOX`]; their remaining arguments are kept. Calls that do
    /// not resolve are left exactly as they are, and so is anything inside raw
    /// text.
    pub fn rewrite_inline_images(&self, markup: &str) -> String {
        static IMAGE_CALL: OnceLock<Regex> = OnceLock::new();
        let pattern = IMAGE_CALL.get_or_init(|| {
            Regex::new(r#"#image\("((?:[^"\\]|\\.)*)""#).expect("valid image call pattern")
        });

        replace_calls(markup, pattern, |caps: &Captures| {
            let declared = unescape_string(&caps[1]);
            match self.resolve_inline(&declared) {
                Some(image) => image.typst_call_head(INLINE_IMAGE_BOX),
                None => {
                    log::warn!("Image not found: {}", declared);
                    caps[0].to_string()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        image::RgbImage::new(width, height).save(path).unwrap();
    }

    #[test]
    fn test_fit_within_scales_down() {
        let size = fit_within(800, 500, ACT_IMAGE_BOX);
        assert_eq!(size.scale, 0.5);
        assert_eq!((size.width, size.height), (400, 250));
    }

    #[test]
    fn test_fit_within_uses_tighter_axis() {
        let size = fit_within(350, 900, INLINE_IMAGE_BOX);
        assert_eq!(size.scale, 0.5);
        assert_eq!((size.width, size.height), (175, 450));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let size = fit_within(120, 80, ACT_IMAGE_BOX);
        assert_eq!(size.scale, 1.0);
        assert_eq!((size.width, size.height), (120, 80));

        let again = fit_within(size.width, size.height, ACT_IMAGE_BOX);
        assert_eq!(again, size);
    }

    #[test]
    fn test_fit_within_rounds() {
        let size = fit_within(1000, 333, INLINE_IMAGE_BOX);
        assert_eq!(size.width, 350);
        assert_eq!(size.height, 117);
    }

    #[test]
    fn test_first_decodable_skips_non_images() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake.png");
        fs::write(&fake, b"not an image").unwrap();
        let real = dir.path().join("real.png");
        write_png(&real, 10, 20);

        let found = first_decodable(vec![dir.path().join("missing.png"), fake, real]).unwrap();

        assert!(found.path.ends_with("real.png"));
        assert_eq!((found.width, found.height), (10, 20));
    }

    #[test]
    fn test_act_image_precedence() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("2. Akt/Akt2.png"), 30, 30);
        write_png(&dir.path().join("Akt2.png"), 40, 40);

        let resolver = ImageResolver::new(dir.path(), dir.path().join("staging"));
        let found = resolver.find_act_image(2).unwrap();

        assert_eq!(found.width, 40);
    }

    #[test]
    fn test_act_image_from_staging() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        write_png(&staging.join("Akt3.jpeg"), 12, 12);

        let resolver = ImageResolver::new(dir.path().join("book"), &staging);

        assert!(resolver.find_act_image(3).is_some());
        assert!(resolver.find_act_image(4).is_none());
    }

    #[test]
    fn test_rewrite_resolved_inline_image() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("bilder/karte.png"), 700, 300);
        let resolver = ImageResolver::new(dir.path(), dir.path().join("staging"));

        let markup = "Vorher #image(\"bilder/karte.png\", alt: \"Karte\") nachher";
        let rewritten = resolver.rewrite_inline_images(markup);

        let absolute = fs::canonicalize(dir.path().join("bilder/karte.png")).unwrap();
        let expected = format!(
            "Vorher #image(\"{}\", width: 262.5pt, height: 112.5pt, alt: \"Karte\") nachher",
            escape_string(&absolute.to_string_lossy())
        );
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn test_rewrite_inline_image_from_staging() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        write_png(&staging.join("1. Akt/bild.png"), 10, 10);
        let resolver = ImageResolver::new(dir.path().join("book"), &staging);

        let rewritten = resolver.rewrite_inline_images("#image(\"1. Akt/bild.png\")");

        assert!(rewritten.contains("width: 7.5pt, height: 7.5pt)"));
    }

    #[test]
    fn test_unresolved_inline_image_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let resolver = ImageResolver::new(dir.path(), dir.path().join("staging"));

        let markup = "#image(\"fehlt \\\"ganz\\\".png\", alt: \"x\")\n#image(\"https://example.org/a.png\")";
        assert_eq!(resolver.rewrite_inline_images(markup), markup);
    }

    #[test]
    fn test_image_calls_in_raw_blocks_are_not_rewritten() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("x.png"), 10, 10);
        let resolver = ImageResolver::new(dir.path(), dir.path().join("staging"));

        let markup = "```\n#image(\"x.png\")\n```\n\nText `#image(\"x.png\")`";
        assert_eq!(resolver.rewrite_inline_images(markup), markup);
    }
}
