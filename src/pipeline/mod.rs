//! Pipeline stages for PDF table extraction.
//!
//! Each submodule implements one transformation step and reads/writes the
//! workspace directories, so every stage can be re-run on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ render ──▶ crop ──▶ ocr ──▶ llm ──▶ postprocess
//! (%PDF)   (Upstage)  (pdfium)  (image)  (Upstage) (chat)  (cleanup)
//! ```
//!
//! 1. [`input`]: validate the PDF before anything is uploaded
//! 2. [`parse`]: Document Parse call; typed view of the table elements
//! 3. [`render`]: rasterise table pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`crop`]: cut each table out of its page image
//! 5. [`ocr`]: word-level OCR per crop, cached on disk
//! 6. [`llm`]: rows to Markdown through a chat model with retry/backoff
//! 7. [`postprocess`]: deterministic cleanup of the model's table
//!
//! [`upstage`] is the HTTP client shared by `parse` and `ocr`; [`files`] holds
//! naming, ordering and atomic-write helpers.

pub mod crop;
pub mod files;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod postprocess;
pub mod render;
pub mod upstage;
