//! Classification of folder children for index documents.
//!
//! Each file in a folder lands in one [`ContentType`] group. The frontmatter
//! `type` of a markdown file wins when it names a known group; otherwise the
//! extension decides, and for markdown the file name is checked against a few
//! naming conventions (`...transcript...`, `...quiz...`).

use std::path::{Path, PathBuf};

use crate::frontmatter::NoteDocument;

/// Suffix of every generated index file name.
pub const INDEX_SUFFIX: &str = "-Index";

const READING_EXTENSIONS: [&str; 5] = ["pdf", "epub", "doc", "docx", "pptx"];
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "mkv", "avi", "webm", "m4v"];
const TRANSCRIPT_EXTENSIONS: [&str; 2] = ["srt", "vtt"];

/// Group a folder child is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentType {
    Reading,
    Video,
    Transcript,
    Assignment,
    Instructions,
    CaseStudy,
    Quiz,
    Note,
    Other,
}

impl ContentType {
    /// Listing order in an index document (after the Sections group).
    pub const ORDER: [ContentType; 9] = [
        ContentType::Reading,
        ContentType::Video,
        ContentType::Transcript,
        ContentType::Assignment,
        ContentType::Instructions,
        ContentType::CaseStudy,
        ContentType::Quiz,
        ContentType::Note,
        ContentType::Other,
    ];

    pub fn heading(self) -> &'static str {
        match self {
            ContentType::Reading => "Readings",
            ContentType::Video => "Videos",
            ContentType::Transcript => "Transcripts",
            ContentType::Assignment => "Assignments",
            ContentType::Instructions => "Instructions",
            ContentType::CaseStudy => "Case Studies",
            ContentType::Quiz => "Quizzes",
            ContentType::Note => "Notes",
            ContentType::Other => "Other Files",
        }
    }

    /// Group named by a frontmatter `type` value.
    fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "reading" | "pdf-reference" => Some(ContentType::Reading),
            "video" | "video-reference" => Some(ContentType::Video),
            "transcript" => Some(ContentType::Transcript),
            "assignment" => Some(ContentType::Assignment),
            "instructions" => Some(ContentType::Instructions),
            "case-study" => Some(ContentType::CaseStudy),
            "quiz" => Some(ContentType::Quiz),
            "note" => Some(ContentType::Note),
            _ => None,
        }
    }
}

/// Classify a file by its name and, for markdown, its declared `type`.
pub fn classify(file_name: &str, declared_type: Option<&str>) -> ContentType {
    if let Some(ty) = declared_type.and_then(ContentType::from_declared) {
        return ty;
    }

    let path = Path::new(file_name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if READING_EXTENSIONS.contains(&ext.as_str()) {
        return ContentType::Reading;
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return ContentType::Video;
    }
    if TRANSCRIPT_EXTENSIONS.contains(&ext.as_str()) {
        return ContentType::Transcript;
    }
    if ext != "md" && ext != "txt" {
        return ContentType::Other;
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace(['_', '-'], " ");
    if stem.contains("transcript") {
        ContentType::Transcript
    } else if stem.contains("assignment") || stem.contains("homework") {
        ContentType::Assignment
    } else if stem.contains("instruction") {
        ContentType::Instructions
    } else if stem.contains("case study") {
        ContentType::CaseStudy
    } else if stem.contains("quiz") {
        ContentType::Quiz
    } else {
        ContentType::Note
    }
}

/// One child of a folder, as listed in that folder's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFileInfo {
    pub file_name: String,
    /// Vault-relative path with `/` separators.
    pub relative_path: String,
    pub title: String,
    pub content_type: ContentType,
    /// Cached `course` value from the child's frontmatter.
    pub course: Option<String>,
    /// Cached `module` value from the child's frontmatter.
    pub module: Option<String>,
}

impl VaultFileInfo {
    /// Describe a non-markdown file (nothing to read).
    pub fn for_file(relative_path: &Path) -> Self {
        let file_name = file_name_of(relative_path);
        Self {
            title: title_from_file_name(&file_name),
            content_type: classify(&file_name, None),
            relative_path: link_path(relative_path),
            file_name,
            course: None,
            module: None,
        }
    }

    /// Describe a markdown file from its parsed contents.
    pub fn for_note(relative_path: &Path, doc: &NoteDocument) -> Self {
        let file_name = file_name_of(relative_path);
        let cached = |key: &str| {
            doc.metadata
                .get_str(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            title: cached("title").unwrap_or_else(|| title_from_file_name(&file_name)),
            content_type: classify(&file_name, doc.metadata.get_str("type")),
            relative_path: link_path(relative_path),
            file_name,
            course: cached("course"),
            module: cached("module"),
        }
    }

    /// Wiki-link to this file. Markdown targets drop their extension.
    pub fn wiki_link(&self) -> String {
        let target = self
            .relative_path
            .strip_suffix(".md")
            .unwrap_or(&self.relative_path);
        format!("[[{}|{}]]", target, self.title)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn title_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(&stem)
}

/// Vault-relative path rendered with forward slashes.
pub fn link_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `"financial accounting"` → `"Financial Accounting"`. Dashes and
/// underscores count as word separators.
pub fn title_case(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Link target (no extension) of a folder's index: `Title-Case-Index`.
pub fn index_link_name(folder_name: &str) -> String {
    format!("{}{}", title_case(folder_name).replace(' ', "-"), INDEX_SUFFIX)
}

/// File name of a folder's index document.
pub fn index_file_name(folder_name: &str) -> String {
    format!("{}.md", index_link_name(folder_name))
}

/// Path of the index document for `folder`.
pub fn index_path(folder: &Path) -> PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder.join(index_file_name(&name))
}

/// Whether `file_name` is the generated index of the folder named
/// `folder_name`. Other `*-Index.md` files are ordinary notes.
pub fn is_index_file(file_name: &str, folder_name: &str) -> bool {
    file_name == index_file_name(folder_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::Metadata;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify("slides.PDF", None), ContentType::Reading);
        assert_eq!(classify("lecture.mp4", None), ContentType::Video);
        assert_eq!(classify("lecture.vtt", None), ContentType::Transcript);
        assert_eq!(classify("data.xlsx", None), ContentType::Other);
    }

    #[test]
    fn classifies_markdown_by_name() {
        assert_eq!(classify("Week-1-Transcript.md", None), ContentType::Transcript);
        assert_eq!(classify("homework_2.md", None), ContentType::Assignment);
        assert_eq!(classify("Case Study - Apple.md", None), ContentType::CaseStudy);
        assert_eq!(classify("case_study_tesla.md", None), ContentType::CaseStudy);
        assert_eq!(classify("Final Quiz.md", None), ContentType::Quiz);
        assert_eq!(classify("Submission Instructions.md", None), ContentType::Instructions);
        assert_eq!(classify("thoughts.md", None), ContentType::Note);
    }

    #[test]
    fn declared_type_wins() {
        assert_eq!(classify("thoughts.md", Some("pdf-reference")), ContentType::Reading);
        assert_eq!(classify("quiz.md", Some("video-reference")), ContentType::Video);
        assert_eq!(classify("quiz.md", Some("something-else")), ContentType::Quiz);
    }

    #[test]
    fn title_case_and_index_names() {
        assert_eq!(title_case("financial accounting"), "Financial Accounting");
        assert_eq!(title_case("week_1-intro"), "Week 1 Intro");
        assert_eq!(index_file_name("corporate finance"), "Corporate-Finance-Index.md");
        assert_eq!(index_link_name("MBA"), "MBA-Index");
        assert_eq!(
            index_path(Path::new("/v/MBA/Finance")),
            PathBuf::from("/v/MBA/Finance/Finance-Index.md")
        );
    }

    #[test]
    fn index_files_recognized() {
        assert!(is_index_file("Finance-Index.md", "Finance"));
        assert!(is_index_file("Corporate-Finance-Index.md", "corporate finance"));
        assert!(!is_index_file("Finance-Index.pdf", "Finance"));
        assert!(!is_index_file("Glossary-Index.md", "Finance"));
        assert!(!is_index_file("Index of terms.md", "Finance"));
    }

    #[test]
    fn note_info_uses_frontmatter() {
        let mut metadata = Metadata::new();
        metadata.set_str("title", "Valuation Basics");
        metadata.set_str("course", "Finance");
        let doc = NoteDocument::new(metadata, "");
        let info = VaultFileInfo::for_note(Path::new("MBA/Finance/valuation.md"), &doc);
        assert_eq!(info.title, "Valuation Basics");
        assert_eq!(info.course.as_deref(), Some("Finance"));
        assert_eq!(info.module, None);
        assert_eq!(info.wiki_link(), "[[MBA/Finance/valuation|Valuation Basics]]");
    }

    #[test]
    fn file_info_keeps_extension_in_link() {
        let info = VaultFileInfo::for_file(Path::new("MBA/slides.pdf"));
        assert_eq!(info.title, "Slides");
        assert_eq!(info.wiki_link(), "[[MBA/slides.pdf|Slides]]");
    }
}
