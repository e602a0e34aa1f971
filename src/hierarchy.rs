//! Depth-based hierarchy detection.
//!
//! A document's position in the vault determines its organizational levels:
//! the first folder below the vault root is the **program**, then **course**,
//! **class** and **module**. Folder names are never interpreted; a folder
//! called `Projects` at depth three is a class like any other.
//!
//! ```text
//! Vault/MBA/Finance/Investment/Fundamentals/Intro/video.md
//!       │   │       │          │            └─ depth 5: lesson (not a field)
//!       │   │       │          └─ module
//!       │   │       └─ class
//!       │   └─ course
//!       └─ program
//! ```
//!
//! [`IndexType`] decides which of those levels a document's metadata may
//! receive. The eligible sets are nested, so the table below is just a prefix
//! length into [`HierarchyField::ALL`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, VaultError};
use crate::vault::relative_to;

/// One hierarchy level stored in document metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyField {
    Program,
    Course,
    Class,
    Module,
}

impl HierarchyField {
    /// All fields in depth order.
    pub const ALL: [HierarchyField; 4] = [
        HierarchyField::Program,
        HierarchyField::Course,
        HierarchyField::Class,
        HierarchyField::Module,
    ];

    /// Frontmatter key for this field.
    pub fn key(self) -> &'static str {
        match self {
            HierarchyField::Program => "program",
            HierarchyField::Course => "course",
            HierarchyField::Class => "class",
            HierarchyField::Module => "module",
        }
    }
}

/// Hierarchy levels for a path. Levels deeper than the path are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyInfo {
    pub program: String,
    pub course: String,
    pub class: String,
    pub module: String,
}

impl HierarchyInfo {
    fn from_segments(segments: &[String]) -> Self {
        let level = |i: usize| segments.get(i).cloned().unwrap_or_default();
        Self {
            program: level(0),
            course: level(1),
            class: level(2),
            module: level(3),
        }
    }

    pub fn get(&self, field: HierarchyField) -> &str {
        match field {
            HierarchyField::Program => &self.program,
            HierarchyField::Course => &self.course,
            HierarchyField::Class => &self.class,
            HierarchyField::Module => &self.module,
        }
    }

    /// Number of populated levels (0..=4).
    pub fn depth(&self) -> usize {
        HierarchyField::ALL
            .iter()
            .take_while(|f| !self.get(**f).is_empty())
            .count()
    }
}

/// Classification controlling which hierarchy fields a document may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    ProgramIndex,
    CourseIndex,
    ClassIndex,
    ModuleIndex,
    LessonIndex,
    Content,
}

static FIELDS_IN_ORDER: [HierarchyField; 4] = HierarchyField::ALL;

/// `(index type, eligible prefix length of HierarchyField::ALL)`.
const ELIGIBLE_FIELDS: [(IndexType, usize); 6] = [
    (IndexType::ProgramIndex, 1),
    (IndexType::CourseIndex, 2),
    (IndexType::ClassIndex, 3),
    (IndexType::ModuleIndex, 4),
    (IndexType::LessonIndex, 4),
    (IndexType::Content, 4),
];

impl IndexType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::ProgramIndex => "program-index",
            IndexType::CourseIndex => "course-index",
            IndexType::ClassIndex => "class-index",
            IndexType::ModuleIndex => "module-index",
            IndexType::LessonIndex => "lesson-index",
            IndexType::Content => "content",
        }
    }

    /// Hierarchy fields this index type may carry, in depth order.
    pub fn eligible_fields(self) -> &'static [HierarchyField] {
        let count = ELIGIBLE_FIELDS
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        &FIELDS_IN_ORDER[..count]
    }

    pub fn is_index(self) -> bool {
        self != IndexType::Content
    }

    fn for_folder_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => None,
            1 => Some(IndexType::ProgramIndex),
            2 => Some(IndexType::CourseIndex),
            3 => Some(IndexType::ClassIndex),
            4 => Some(IndexType::ModuleIndex),
            _ => Some(IndexType::LessonIndex),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        ELIGIBLE_FIELDS
            .iter()
            .map(|(ty, _)| *ty)
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| VaultError::Configuration(format!("unknown index type '{}'", s)))
    }
}

/// Folder segments between the vault root and `path`.
///
/// For a document the last segment is the file name and is dropped; for a
/// folder every segment counts.
fn folder_segments(path: &Path, vault_root: &Path, is_folder: bool) -> Result<Vec<String>> {
    let relative: PathBuf = relative_to(path, vault_root)?;
    let mut segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if !is_folder {
        segments.pop();
    }
    Ok(segments)
}

/// Hierarchy levels for a document at `path`.
pub fn detect(path: &Path, vault_root: &Path) -> Result<HierarchyInfo> {
    let segments = folder_segments(path, vault_root, false)?;
    Ok(HierarchyInfo::from_segments(&segments))
}

/// Hierarchy levels for the folder at `folder` (the folder itself counts).
pub fn detect_folder(folder: &Path, vault_root: &Path) -> Result<HierarchyInfo> {
    let segments = folder_segments(folder, vault_root, true)?;
    Ok(HierarchyInfo::from_segments(&segments))
}

/// Folder depth below the vault root (`0` for the root itself).
pub fn folder_depth(folder: &Path, vault_root: &Path) -> Result<usize> {
    Ok(folder_segments(folder, vault_root, true)?.len())
}

/// Classify `path` as a folder index (by folder depth) or as content.
///
/// With `is_folder_index` set, `path` is the folder the index describes.
pub fn classify_index_type(
    path: &Path,
    vault_root: &Path,
    is_folder_index: bool,
) -> Result<IndexType> {
    if !is_folder_index {
        // Validates containment even though content is depth-independent.
        relative_to(path, vault_root)?;
        return Ok(IndexType::Content);
    }
    let depth = folder_depth(path, vault_root)?;
    IndexType::for_folder_depth(depth).ok_or_else(|| {
        VaultError::Configuration(format!(
            "no index type for the vault root itself ({})",
            path.display()
        ))
    })
}
