//! Page-image corpus on disk.
//!
//! Every supported image file directly under the data directory is a
//! one-page document. Every sub-directory is a multi-page document whose
//! image files, sorted by name, are its pages (e.g. a rasterized PDF).
//! Document ids follow the sorted order of the top-level entries.

use crate::config::StorageConfig;
use crate::error::{RagError, Result};
use crate::pages::{PageInventory, PageRef};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A page image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page: PageRef,
    pub path: PathBuf,
}

impl PageImage {
    /// MIME type derived from the file extension.
    pub fn mime_type(&self) -> &'static str {
        match extension_of(&self.path).as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| RagError::io(&self.path, e))
    }
}

/// An indexed document and its ordered pages.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub doc_id: u32,
    pub name: String,
    pub pages: Vec<PathBuf>,
}

/// Where a new document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// An existing file or page directory on the local filesystem.
    Path(PathBuf),
    /// Raw bytes received from an upload, with the client's file name.
    Upload { bytes: Vec<u8>, filename: String },
}

/// Page images grouped by document.
#[derive(Debug, Clone)]
pub struct PageStore {
    root: PathBuf,
    extensions: Vec<String>,
    documents: BTreeMap<u32, StoredDocument>,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

impl PageStore {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.into_iter().map(|e| e.to_lowercase()).collect(),
            documents: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.data_dir.clone(), config.supported_extensions.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_supported(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn page_files(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Rescan the data directory. Returns the number of documents found.
    ///
    /// A missing data directory yields an empty corpus.
    pub fn load(&mut self) -> Result<usize> {
        self.documents.clear();
        if !self.root.is_dir() {
            tracing::warn!(root = %self.root.display(), "data directory does not exist");
            return Ok(0);
        }

        let mut next_id = 0u32;
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                RagError::io(path, std::io::Error::other(e.to_string()))
            })?;
            let path = entry.path();

            let pages = if entry.file_type().is_dir() {
                self.page_files(path)
            } else if self.is_supported(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };

            if pages.is_empty() {
                continue;
            }

            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::debug!(doc_id = next_id, %name, pages = pages.len(), "loaded document");
            self.documents.insert(
                next_id,
                StoredDocument {
                    doc_id: next_id,
                    name,
                    pages,
                },
            );
            next_id += 1;
        }

        Ok(self.documents.len())
    }

    /// Copy a document into the data directory. Call [`PageStore::load`]
    /// afterwards to pick it up.
    pub fn add_document(&self, source: DocumentSource) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| RagError::io(&self.root, e))?;

        match source {
            DocumentSource::Path(path) => {
                let file_name = path
                    .file_name()
                    .ok_or_else(|| RagError::UnsupportedFile(path.clone()))?;
                let dest = self.root.join(file_name);

                if path.is_dir() {
                    fs::create_dir_all(&dest).map_err(|e| RagError::io(&dest, e))?;
                    for page in self.page_files(&path) {
                        if let Some(page_name) = page.file_name() {
                            let target = dest.join(page_name);
                            fs::copy(&page, &target).map_err(|e| RagError::io(&page, e))?;
                        }
                    }
                    return Ok(dest);
                }

                if !self.is_supported(&path) {
                    return Err(RagError::UnsupportedFile(path));
                }
                if dest != path {
                    fs::copy(&path, &dest).map_err(|e| RagError::io(&path, e))?;
                }
                Ok(dest)
            }
            DocumentSource::Upload { bytes, filename } => {
                // Only the final component of a client-supplied name is trusted.
                let file_name = Path::new(&filename)
                    .file_name()
                    .map(PathBuf::from)
                    .ok_or_else(|| RagError::UnsupportedFile(PathBuf::from(&filename)))?;
                if !self.is_supported(&file_name) {
                    return Err(RagError::UnsupportedFile(file_name));
                }
                let dest = self.root.join(file_name);
                fs::write(&dest, bytes).map_err(|e| RagError::io(&dest, e))?;
                Ok(dest)
            }
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = &StoredDocument> {
        self.documents.values()
    }

    pub fn document(&self, doc_id: u32) -> Option<&StoredDocument> {
        self.documents.get(&doc_id)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.documents.values().map(|d| d.pages.len()).sum()
    }

    /// Image for a page, if the page exists.
    pub fn page(&self, page: PageRef) -> Option<PageImage> {
        let doc = self.documents.get(&page.doc_id)?;
        let idx = (page.page_num as usize).checked_sub(1)?;
        doc.pages.get(idx).map(|path| PageImage {
            page,
            path: path.clone(),
        })
    }

    /// Images for the given pages in order, skipping pages that do not exist.
    pub fn pages_for(&self, pages: &[PageRef]) -> Vec<PageImage> {
        pages.iter().filter_map(|p| self.page(*p)).collect()
    }

    /// All pages of a document in order.
    pub fn document_pages(&self, doc_id: u32) -> Vec<PageImage> {
        let count = self.page_count(doc_id).unwrap_or(0);
        (1..=count)
            .filter_map(|page_num| self.page(PageRef::new(doc_id, page_num)))
            .collect()
    }
}

impl PageInventory for PageStore {
    fn page_count(&self, doc_id: u32) -> Option<u32> {
        self.documents
            .get(&doc_id)
            .map(|doc| u32::try_from(doc.pages.len()).unwrap_or(u32::MAX))
    }
}
