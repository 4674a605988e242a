pub mod error;
pub mod outline;
pub mod utils;

pub use error::OutlineError;
pub use outline::{OutlineItem, Style, View};

use anyhow::{Context, Result};
use log::{debug, info, trace};
use lopdf::Document;
use std::path::Path;

/// Loads both documents and returns `dst` with the outline of `src` appended to
/// its own, every bookmarked page shifted by `offset`. Nothing is written to disk.
pub fn get_doc_with_copied_outlines(
    src_path: impl AsRef<Path>,
    dst_path: impl AsRef<Path>,
    offset: i64,
) -> Result<Document> {
    let src_path = src_path.as_ref();
    let dst_path = dst_path.as_ref();

    info!("Load the source document '{}'", src_path.display());
    let source = Document::load(src_path)
        .with_context(|| format!("Could not load the PDF file '{}'", src_path.display()))?;

    info!("Load the destination document '{}'", dst_path.display());
    let mut destination = Document::load(dst_path)
        .with_context(|| format!("Could not load the PDF file '{}'", dst_path.display()))?;

    let copied = copy_outlines(&source, &mut destination, offset).with_context(|| {
        format!(
            "Could not copy the outline of '{}' into '{}'",
            src_path.display(),
            dst_path.display()
        )
    })?;
    info!("Copied {copied} outline items with an offset of {offset}");

    Ok(destination)
}

/// Appends a copy of the whole outline of `source` after the outline items
/// already present in `destination`, shifting every target page by `offset`.
/// Returns the number of items copied, at every level.
///
/// The copy is completed before `destination` is modified: on error the
/// destination is left as it was.
pub fn copy_outlines(source: &Document, destination: &mut Document, offset: i64) -> Result<usize> {
    let source_items = outline::read_outline(source)?;

    if source_items.is_empty() {
        info!("The source document has no outline, nothing to copy");
        return Ok(0);
    }

    let page_count = destination.get_pages().len();
    debug!("The destination document has {page_count} pages");

    let copies = source_items
        .iter()
        .map(|item| copy_outline_item(item, offset, page_count))
        .collect::<Result<Vec<_>>>()?;

    outline::append_outline(destination, &copies)?;

    Ok(copies.iter().map(OutlineItem::item_count).sum())
}

/// Deep copy of `item` and its descendants with the pages shifted by `offset`.
pub fn copy_outline_item(item: &OutlineItem, offset: i64, page_count: usize) -> Result<OutlineItem> {
    let page = page_of_item(item, offset, page_count)?;
    trace!("Copy the outline item '{}' to the page index {page}", item.title);

    let children = item
        .children
        .iter()
        .map(|child| copy_outline_item(child, offset, page_count))
        .collect::<Result<Vec<_>>>()?;

    Ok(OutlineItem {
        title: item.title.clone(),
        page: Some(page),
        view: item.view,
        style: item.style,
        open: item.open,
        children,
    })
}

/// Zero-based index of the page targeted by `item` once shifted by `offset`,
/// which must be a page of a document with `page_count` pages.
pub fn page_of_item(item: &OutlineItem, offset: i64, page_count: usize) -> Result<u32> {
    let Some(page) = item.page else {
        return Err(OutlineError::UnresolvedDestination {
            title: item.title.clone(),
        }
        .into());
    };

    let shifted = i64::from(page).checked_add(offset);

    match shifted.and_then(|shifted| u32::try_from(shifted).ok()) {
        Some(shifted) if (shifted as usize) < page_count => Ok(shifted),
        _ => Err(OutlineError::PageOutOfRange {
            title: item.title.clone(),
            page: shifted.unwrap_or(i64::MAX),
            page_count,
        }
        .into()),
    }
}
