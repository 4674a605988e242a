use thiserror::Error;

/// Failures of the outline copier which the caller may want to tell apart.
#[derive(Error, Debug)]
pub enum OutlineError {
    /// The item has no destination, or its destination does not point to a page of its document
    #[error("The outline item '{title}' does not point to any page of its document")]
    UnresolvedDestination { title: String },

    /// The shifted page does not exist in the destination document
    #[error(
        "The outline item '{title}' would point to the page index {page}, \
        but the destination document has {page_count} pages"
    )]
    PageOutOfRange {
        title: String,
        page: i64,
        page_count: usize,
    },

    #[error("Malformed outline: {0}")]
    MalformedOutline(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}
