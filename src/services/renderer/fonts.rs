use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use resvg::usvg::fontdb;
use tracing::{debug, info, warn};

use crate::config::CertificateConfig;

/// Family of the face compiled into the binary. It is always the last
/// entry of every `font-family` list, so text is drawn even on hosts
/// without any installed fonts.
pub const FALLBACK_FAMILY: &str = "DejaVu Sans";

static FALLBACK_FACE: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");

/// Fonts available to the certificate renderer.
///
/// The bundled face, system fonts (when enabled) and everything under the
/// fonts directory are loaded once at startup. Templates may also name a
/// font file by absolute path; those are loaded per render into a copy of
/// the shared database.
#[derive(Clone)]
pub struct FontLibrary {
    database: Arc<fontdb::Database>,
    fonts_dir: PathBuf,
    default_family: String,
}

impl FontLibrary {
    pub fn from_config(config: &CertificateConfig) -> Self {
        let mut database = bundled_database();

        if config.load_system_fonts {
            database.load_system_fonts();
        }

        if config.fonts_dir.is_dir() {
            database.load_fonts_dir(&config.fonts_dir);
        } else {
            debug!(dir = %config.fonts_dir.display(), "Certificate fonts directory not found");
        }

        info!(faces = database.len(), "Certificate font database loaded");

        Self {
            database: Arc::new(database),
            fonts_dir: config.fonts_dir.clone(),
            default_family: config.default_font_family.clone(),
        }
    }

    /// A library holding only the bundled face.
    pub fn bundled(fonts_dir: impl Into<PathBuf>, default_family: impl Into<String>) -> Self {
        Self {
            database: Arc::new(bundled_database()),
            fonts_dir: fonts_dir.into(),
            default_family: default_family.into(),
        }
    }

    pub fn default_family(&self) -> &str {
        &self.default_family
    }

    /// Maps a template font reference to a file: either an existing path or
    /// a file name inside the fonts directory.
    pub fn resolve_font_path(&self, font: &str) -> Option<PathBuf> {
        let direct = Path::new(font);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }

        let stored = self.fonts_dir.join(font);
        stored.is_file().then_some(stored)
    }

    /// Loads the requested font files and reports the family each one
    /// registered under.
    pub(crate) fn prepare<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> PreparedFonts {
        let mut database = Arc::clone(&self.database);
        let mut families = HashMap::new();

        for font in requested {
            if families.contains_key(font) {
                continue;
            }
            let Some(path) = self.resolve_font_path(font) else {
                continue;
            };

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), "Failed to read certificate font: {}", e);
                    continue;
                }
            };

            let database = Arc::make_mut(&mut database);
            let ids = database.load_font_source(fontdb::Source::Binary(Arc::new(bytes)));
            let family = ids
                .first()
                .and_then(|id| database.face(*id))
                .and_then(|face| face.families.first())
                .map(|(name, _)| name.clone());

            match family {
                Some(family) => {
                    families.insert(font.to_string(), family);
                }
                None => warn!(path = %path.display(), "Certificate font contains no usable faces"),
            }
        }

        PreparedFonts {
            database,
            families,
            default_family: self.default_family.clone(),
        }
    }
}

pub(crate) struct PreparedFonts {
    pub database: Arc<fontdb::Database>,
    families: HashMap<String, String>,
    pub default_family: String,
}

impl PreparedFonts {
    /// The `font-family` attribute value for a field's font reference.
    pub fn family_attribute(&self, font: Option<&str>) -> String {
        match font.and_then(|f| self.families.get(f)) {
            Some(family) => format!(
                "'{}', {}, '{}'",
                family.replace('\'', ""),
                self.default_family,
                FALLBACK_FAMILY
            ),
            None => format!("{}, '{}'", self.default_family, FALLBACK_FAMILY),
        }
    }
}

fn bundled_database() -> fontdb::Database {
    let mut database = fontdb::Database::new();
    database.load_font_data(FALLBACK_FACE.to_vec());
    database.set_sans_serif_family(FALLBACK_FAMILY);
    database
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_files_inside_the_fonts_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Brand.ttf"), b"not really a font").unwrap();

        let fonts = FontLibrary::bundled(dir.path(), "sans-serif");
        assert_eq!(fonts.resolve_font_path("Brand.ttf"), Some(dir.path().join("Brand.ttf")));
        assert_eq!(fonts.resolve_font_path("Missing.ttf"), None);
    }

    #[test]
    fn resolves_absolute_paths_directly() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let fonts = FontLibrary::bundled("/nonexistent", "serif");

        let path = file.path().to_str().unwrap();
        assert_eq!(fonts.resolve_font_path(path), Some(file.path().to_path_buf()));
    }

    #[test]
    fn unusable_fonts_fall_back_to_the_default_family() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Broken.ttf"), b"garbage").unwrap();

        let fonts = FontLibrary::bundled(dir.path(), "sans-serif");
        let prepared = fonts.prepare(["Broken.ttf", "Unknown.ttf"]);

        let expected = "sans-serif, 'DejaVu Sans'";
        assert_eq!(prepared.family_attribute(Some("Broken.ttf")), expected);
        assert_eq!(prepared.family_attribute(Some("Unknown.ttf")), expected);
        assert_eq!(prepared.family_attribute(None), expected);
    }

    #[test]
    fn bundled_face_is_always_available() {
        let fonts = FontLibrary::bundled("/nonexistent", "sans-serif");
        let prepared = fonts.prepare(std::iter::empty::<&str>());

        let query = fontdb::Query {
            families: &[fontdb::Family::Name(FALLBACK_FAMILY)],
            ..Default::default()
        };
        assert!(prepared.database.query(&query).is_some());
        assert!(prepared.database.len() >= 1);
    }
}
