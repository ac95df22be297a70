//! Reference catalog of known entities.
//!
//! Layout on disk, either or both:
//! - `<dir>/<entity_id>/*.png`: one folder per entity, one file per variant
//! - `<dir>/<entity_id>.png`: a single flat image named after the entity
//!
//! Descriptors are computed once at startup, in parallel.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Result, ScanError};
use crate::vision::{DescriptorSet, FeatureExtractor};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// One reference image of an entity.
#[derive(Clone, Debug)]
pub struct Variant {
    /// Image the descriptors came from
    pub source: PathBuf,
    pub descriptors: DescriptorSet,
}

#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub entity_id: String,
    pub variants: Vec<Variant>,
}

/// All entities, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists `(entity_id, image_path)` pairs under `dir`, sorted.
fn discover(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };

        if path.is_dir() {
            let id = path
                .file_name()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .unwrap_or(stem);
            for variant in fs::read_dir(&path)? {
                let variant = variant?.path();
                if variant.is_file() && is_image(&variant) {
                    found.push((id.clone(), variant));
                }
            }
        } else if is_image(&path) {
            found.push((stem, path));
        }
    }

    found.sort();
    Ok(found)
}

impl Catalog {
    /// Builds the catalog from a directory tree.
    ///
    /// Unreadable and featureless images are skipped with a warning. Fails
    /// when the directory is missing or nothing usable is left.
    pub fn build(dir: &Path, extractor: &FeatureExtractor) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ScanError::ConfigMissing(dir.to_path_buf()));
        }

        let images = discover(dir)?;
        log::info!("Building catalog from {} images in {}", images.len(), dir.display());

        let variants: Vec<(String, Variant)> = images
            .into_par_iter()
            .filter_map(|(id, path)| {
                let img = match image::open(&path) {
                    Ok(img) => img.to_luma8(),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        return None;
                    }
                };
                let descriptors = extractor.extract_reference(&img);
                if descriptors.is_empty() {
                    log::warn!("Skipping {}: no features", path.display());
                    return None;
                }
                Some((
                    id,
                    Variant {
                        source: path,
                        descriptors,
                    },
                ))
            })
            .collect();

        let mut grouped: BTreeMap<String, Vec<Variant>> = BTreeMap::new();
        for (id, variant) in variants {
            grouped.entry(id).or_default().push(variant);
        }

        if grouped.is_empty() {
            return Err(ScanError::invalid(dir, "catalog has no usable images"));
        }

        let catalog = Self::from_entries(
            grouped
                .into_iter()
                .map(|(entity_id, variants)| CatalogEntry { entity_id, variants })
                .collect(),
        );
        log::info!(
            "Catalog ready: {} entities, {} variants",
            catalog.len(),
            catalog.variant_count()
        );
        Ok(catalog)
    }

    pub fn from_entries(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn variant_count(&self) -> usize {
        self.entries.iter().map(|e| e.variants.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use image::{GrayImage, ImageBuffer, Luma};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tempfile::tempdir;

    fn textured(seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells: Vec<u8> = (0..144).map(|_| rng.gen_range(0..=255)).collect();
        ImageBuffer::from_fn(96, 96, |x, y| Luma([cells[((y / 8) * 12 + x / 8) as usize]]))
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&MatcherConfig::default())
    }

    #[test]
    fn test_folders_and_flat_files() {
        let dir = tempdir().unwrap();
        let hero = dir.path().join("hero_b");
        fs::create_dir(&hero).unwrap();
        textured(1).save(hero.join("default.png")).unwrap();
        textured(2).save(hero.join("skin.PNG")).unwrap();
        textured(3).save(dir.path().join("hero_a.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let catalog = Catalog::build(dir.path(), &extractor()).unwrap();
        let ids: Vec<&str> = catalog.entries().iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["hero_a", "hero_b"]);
        assert_eq!(catalog.entries()[1].variants.len(), 2);
        assert_eq!(catalog.variant_count(), 3);
    }

    #[test]
    fn test_bad_images_are_skipped() {
        let dir = tempdir().unwrap();
        textured(4).save(dir.path().join("good.png")).unwrap();
        fs::write(dir.path().join("broken.png"), b"garbage").unwrap();
        let flat: GrayImage = ImageBuffer::from_pixel(96, 96, Luma([50]));
        flat.save(dir.path().join("flat.png")).unwrap();

        let catalog = Catalog::build(dir.path(), &extractor()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries()[0].entity_id, "good");
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Catalog::build(dir.path(), &extractor()).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Catalog::build(&dir.path().join("nope"), &extractor()).unwrap_err();
        assert!(matches!(err, ScanError::ConfigMissing(_)));
    }
}
