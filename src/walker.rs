use crate::asset::{is_image_file, ImageAsset};
use crate::constants::ORIGINALS_DIR;
use crate::error::{PipelineError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Everything the walker found under one root, sorted by path.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub root: PathBuf,
    /// Unsuffixed originals: the work list.
    pub candidates: Vec<ImageAsset>,
    /// Pipeline outputs already on disk (`-optimized`, `-640w`, composites...).
    pub derived: Vec<ImageAsset>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.derived.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &ImageAsset> {
        self.candidates.iter().chain(self.derived.iter())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
    recursive: bool,
    include: Option<Pattern>,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(PipelineError::FileNotFound(root));
        }
        if !root.is_dir() {
            return Err(PipelineError::NotADirectory(root));
        }

        Ok(Self {
            root,
            recursive: true,
            include: None,
        })
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Restricts the work list to files whose root-relative path matches
    /// `pattern`. Derived files are always reported so existing siblings
    /// are never overlooked.
    pub fn with_include(mut self, pattern: &str) -> Result<Self> {
        self.include = Some(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn walk(&self) -> Result<Discovery> {
        let walker = if self.recursive {
            WalkDir::new(&self.root)
        } else {
            WalkDir::new(&self.root).max_depth(1)
        };

        let mut discovery = Discovery {
            root: self.root.clone(),
            ..Discovery::default()
        };

        for entry in walker
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_image_file(path) {
                continue;
            }

            let asset = match ImageAsset::discover(path) {
                Ok(asset) => asset,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if asset.variant.is_derived() {
                discovery.derived.push(asset);
            } else if self.is_included(path) {
                discovery.candidates.push(asset);
            } else {
                tracing::debug!("Filtered out {}", path.display());
            }
        }

        tracing::debug!(
            "Discovered {} candidates and {} derived files under {}",
            discovery.candidates.len(),
            discovery.derived.len(),
            self.root.display()
        );
        Ok(discovery)
    }

    fn is_included(&self, path: &Path) -> bool {
        match &self.include {
            None => true,
            Some(pattern) => {
                let relative = path.strip_prefix(&self.root).unwrap_or(path);
                pattern.matches_path(relative)
            }
        }
    }
}

/// Hidden entries (including our own temp files) and `originals/` archives.
fn is_excluded(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && name == ORIGINALS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::VariantKind;
    use image::RgbImage;
    use std::fs;
    use tempfile::TempDir;

    fn touch_image(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        RgbImage::new(4, 4).save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    fn names(assets: &[ImageAsset]) -> Vec<String> {
        assets.iter().map(|a| a.file_name()).collect()
    }

    #[test]
    fn test_walk_splits_candidates_and_derived() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch_image(&root.join("room.jpg"));
        touch_image(&root.join("room-optimized.webp"));
        touch_image(&root.join("spa-640w.webp"));
        touch_image(&root.join("lobby.png"));
        fs::write(root.join("notes.txt"), b"not an image").unwrap();

        let discovery = DirectoryWalker::new(root).unwrap().walk().unwrap();
        assert_eq!(names(&discovery.candidates), vec!["lobby.png", "room.jpg"]);
        assert_eq!(
            names(&discovery.derived),
            vec!["room-optimized.webp", "spa-640w.webp"]
        );
        assert_eq!(discovery.derived[1].variant, VariantKind::Responsive(640));
    }

    #[test]
    fn test_walk_skips_originals_and_hidden() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch_image(&root.join("originals/room.jpg"));
        touch_image(&root.join(".cache/room.jpg"));
        touch_image(&root.join("rooms/suite.jpg"));
        fs::write(root.join("rooms/.asset-squeeze-abc.tmp"), b"partial").unwrap();

        let discovery = DirectoryWalker::new(root).unwrap().walk().unwrap();
        assert_eq!(names(&discovery.candidates), vec!["suite.jpg"]);
        assert!(discovery.derived.is_empty());
    }

    #[test]
    fn test_walk_non_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch_image(&root.join("top.jpg"));
        touch_image(&root.join("nested/deep.jpg"));

        let discovery = DirectoryWalker::new(root)
            .unwrap()
            .recursive(false)
            .walk()
            .unwrap();
        assert_eq!(names(&discovery.candidates), vec!["top.jpg"]);
    }

    #[test]
    fn test_include_filter_applies_to_candidates_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch_image(&root.join("venues/harbour/hero.jpg"));
        touch_image(&root.join("venues/harbour/bar.jpg"));
        touch_image(&root.join("venues/harbour/bar-optimized.webp"));

        let discovery = DirectoryWalker::new(root)
            .unwrap()
            .with_include("venues/*/hero*")
            .unwrap()
            .walk()
            .unwrap();
        assert_eq!(names(&discovery.candidates), vec!["hero.jpg"]);
        assert_eq!(names(&discovery.derived), vec!["bar-optimized.webp"]);
    }

    #[test]
    fn test_walk_is_restartable() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch_image(&root.join("a.jpg"));
        touch_image(&root.join("b.jpg"));

        let first = DirectoryWalker::new(root).unwrap().walk().unwrap();
        assert_eq!(first.candidates.len(), 2);

        fs::remove_file(root.join("a.jpg")).unwrap();
        touch_image(&root.join("a-optimized.webp"));

        let second = DirectoryWalker::new(root).unwrap().walk().unwrap();
        assert_eq!(names(&second.candidates), vec!["b.jpg"]);
        assert_eq!(names(&second.derived), vec!["a-optimized.webp"]);
    }

    #[test]
    fn test_walker_rejects_missing_root() {
        let result = DirectoryWalker::new("/nonexistent/root");
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }

    #[test]
    fn test_walker_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.jpg");
        touch_image(&file);
        let result = DirectoryWalker::new(&file);
        assert!(matches!(result, Err(PipelineError::NotADirectory(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let result = DirectoryWalker::new(temp_dir.path()).unwrap().with_include("[");
        assert!(matches!(result, Err(PipelineError::Pattern(_))));
    }
}
