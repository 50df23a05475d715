//! Client-side validation of files chosen for import.
//!
//! [`FileSelection`] accumulates files across several picks the same way
//! the upload form does: duplicates (same name and size) are skipped, at
//! most [`MAX_FILES`] are kept, and only CSV/JSON files are accepted.
//! [`validate_batch`] re-checks a batch right before it is uploaded.

use crate::error::CoreError;

/// Maximum number of files in one upload batch.
pub const MAX_FILES: usize = 5;

/// Accepted file extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "json"];

/// A file staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Whether `name` ends in one of [`ALLOWED_EXTENSIONS`].
pub fn has_supported_extension(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Why a picked file was not added to the selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionRejection {
    /// The selection already holds [`MAX_FILES`] files.
    #[error("Maximum {max} files")]
    TooManyFiles { max: usize },

    /// The file name does not end in `.csv` or `.json`.
    #[error("File {0} is not CSV or JSON")]
    UnsupportedType(String),
}

/// Files picked so far for the next upload.
#[derive(Debug, Default)]
pub struct FileSelection {
    files: Vec<UploadFile>,
}

impl FileSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add newly picked files, returning one rejection per refused file.
    ///
    /// Hitting the file limit stops processing the rest of `picked`.
    pub fn add(&mut self, picked: impl IntoIterator<Item = UploadFile>) -> Vec<SelectionRejection> {
        let mut rejections = Vec::new();

        for file in picked {
            if self.contains(&file) {
                continue;
            }
            if self.files.len() >= MAX_FILES {
                rejections.push(SelectionRejection::TooManyFiles { max: MAX_FILES });
                break;
            }
            if has_supported_extension(&file.name) {
                self.files.push(file);
            } else {
                rejections.push(SelectionRejection::UnsupportedType(file.name));
            }
        }

        rejections
    }

    /// Remove the file at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<UploadFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Take every selected file, leaving the selection empty.
    pub fn take(&mut self) -> Vec<UploadFile> {
        std::mem::take(&mut self.files)
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn contains(&self, file: &UploadFile) -> bool {
        self.files
            .iter()
            .any(|f| f.name == file.name && f.size() == file.size())
    }
}

/// Check a batch right before upload: 1 to [`MAX_FILES`] supported files.
pub fn validate_batch(files: &[UploadFile]) -> Result<(), CoreError> {
    if files.is_empty() {
        return Err(CoreError::Validation("No files selected".into()));
    }
    if files.len() > MAX_FILES {
        return Err(CoreError::Validation(format!("Maximum {MAX_FILES} files")));
    }
    if let Some(bad) = files.iter().find(|f| !has_supported_extension(&f.name)) {
        return Err(CoreError::Validation(format!(
            "File {} is not CSV or JSON",
            bad.name
        )));
    }
    Ok(())
}
