//! Ordered collection of user-selected input images.

use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    filename: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl InputImage {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a `.jpg`, `.jpeg` or `.png` file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_type_for_path(path)
            .ok_or_else(|| anyhow!("unsupported image type: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("image path has no file name: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read image {}", path.display()))?;
        Ok(Self::new(filename, mime_type, bytes))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Selection order is preserved and duplicates are allowed.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    images: Vec<InputImage>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, images: impl IntoIterator<Item = InputImage>) {
        self.images.extend(images);
    }

    pub fn remove_at(&mut self, index: usize) -> Option<InputImage> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    /// Snapshot handed to a run; later edits to the set do not reach it.
    pub fn current(&self) -> Arc<[InputImage]> {
        Arc::from(self.images.as_slice())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputImage> {
        self.images.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> InputImage {
        InputImage::new(name, "image/png", name.as_bytes().to_vec())
    }

    #[test]
    fn keeps_selection_order_and_duplicates() {
        let mut set = ImageSet::new();
        set.add([image("a.png"), image("b.png")]);
        set.add([image("a.png")]);

        let names: Vec<&str> = set.iter().map(InputImage::filename).collect();
        assert_eq!(names, vec!["a.png", "b.png", "a.png"]);
    }

    #[test]
    fn remove_at_ignores_out_of_range_index() {
        let mut set = ImageSet::new();
        set.add([image("a.png"), image("b.png")]);

        assert_eq!(set.remove_at(5), None);
        let removed = set.remove_at(0).expect("removed");
        assert_eq!(removed.filename(), "a.png");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_later_edits() {
        let mut set = ImageSet::new();
        set.add([image("a.png")]);
        let snapshot = set.current();

        set.add([image("b.png")]);
        set.remove_at(0);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].filename(), "a.png");
    }

    #[test]
    fn only_jpeg_and_png_are_accepted() {
        assert_eq!(mime_type_for_path(Path::new("look.JPG")), Some("image/jpeg"));
        assert_eq!(mime_type_for_path(Path::new("look.png")), Some("image/png"));
        assert_eq!(mime_type_for_path(Path::new("look.gif")), None);
        assert_eq!(mime_type_for_path(Path::new("look")), None);
    }

    #[tokio::test]
    async fn load_rejects_unsupported_extension() {
        let err = InputImage::load("outfit.webp").await.expect_err("rejected");
        assert!(err.to_string().contains("unsupported image type"));
    }
}
