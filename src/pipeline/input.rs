//! Input validation for the PDF handed to the parse and render stages.
//!
//! Both the Document Parse upload and pdfium fail with unhelpful messages on a
//! non-PDF file, so the `%PDF` magic bytes are checked up front.

use crate::error::Table2MdError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<PathBuf, Table2MdError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(Table2MdError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == PDF_MAGIC => {}
                Ok(()) => return Err(Table2MdError::NotAPdf { path, magic }),
                Err(_) => {
                    return Err(Table2MdError::NotAPdf {
                        path,
                        magic: [0; 4],
                    })
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Table2MdError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Table2MdError::FileNotFound { path });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(path)
}

/// The first PDF in `input/`, in natural order.
///
/// Lets `table2md parse` run without an argument inside a workspace that
/// follows the standard layout.
pub fn find_input_pdf(input_dir: &Path) -> Result<PathBuf, Table2MdError> {
    super::files::list_with_extension(input_dir, "pdf")?
        .into_iter()
        .next()
        .ok_or_else(|| Table2MdError::FileNotFound {
            path: input_dir.join("*.pdf"),
        })
}
