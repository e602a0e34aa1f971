//! # Notebook Automation
//!
//! Keeps a vault of course notes organized around a fixed hierarchy:
//! **program → course → class → module**, read strictly from folder depth.
//!
//! The library fills hierarchy metadata into each note's YAML frontmatter
//! without clobbering hand-edited values, generates one index document per
//! folder, and runs PDFs and lecture videos through a staged pipeline
//! (extraction → AI summary → note → share link) with per-item failure
//! isolation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │  Sources   │──▶│   Queue    │──▶│  Vault notes │
//! │ PDF/Video  │   │ 4 stages   │   │ (frontmatter)│
//! └────────────┘   └────────────┘   └──────┬───────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!               ┌────────────┐      ┌────────────┐
//!               │  Metadata  │      │  Indexes   │
//!               │ reconcile  │      │ per folder │
//!               └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`vault`] | Vault context and path helpers |
//! | [`hierarchy`] | Depth-based hierarchy detection and index types |
//! | [`frontmatter`] | YAML frontmatter and the metadata store |
//! | [`metadata`] | Non-destructive metadata reconciliation |
//! | [`content`] | Classification of folder children |
//! | [`index`] | Folder index generation |
//! | [`scan`] | Vault and resource directory walks |
//! | [`chunk`] | Overlap-aware text chunking |
//! | [`extract`] | PDF and transcript text extraction |
//! | [`summarize`] | AI summarization providers |
//! | [`share`] | Share-link providers |
//! | [`note`] | Notes for processed source documents |
//! | [`queue`] | Staged batch processing |
//! | [`progress`] | Queue progress reporting |
//! | [`commands`] | CLI command runners |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod frontmatter;
pub mod hierarchy;
pub mod index;
pub mod metadata;
pub mod note;
pub mod progress;
pub mod queue;
pub mod scan;
pub mod share;
pub mod summarize;
pub mod vault;
