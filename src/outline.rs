use crate::error::OutlineError;
use log::{debug, trace};
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use std::collections::{HashMap, HashSet};

const MAX_DESTINATION_INDIRECTIONS: u8 = 8;
const MAX_NAME_TREE_DEPTH: u8 = 32;
/// Nesting levels allowed below the outline root, top-level items being level 0.
pub const MAX_OUTLINE_DEPTH: usize = 64;
const ITALIC_FLAG: i64 = 1;
const BOLD_FLAG: i64 = 2;

/// How the viewer displays the target page when a bookmark is clicked.
/// `None` coordinates are written as `null`, i.e. "keep the current value".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum View {
    Xyz {
        left: Option<f32>,
        top: Option<f32>,
        zoom: Option<f32>,
    },
    #[default]
    Fit,
    FitH {
        top: Option<f32>,
    },
    FitV {
        left: Option<f32>,
    },
    FitR {
        left: f32,
        bottom: f32,
        right: f32,
        top: f32,
    },
    FitB,
    FitBH {
        top: Option<f32>,
    },
    FitBV {
        left: Option<f32>,
    },
}

impl View {
    /// Parses the operands following the page in an explicit destination array,
    /// e.g. `/XYZ 0 842 null`. Anything unknown falls back to `/Fit`.
    fn from_operands(operands: &[Object]) -> View {
        let Some((Object::Name(kind), params)) = operands.split_first() else {
            return View::Fit;
        };
        let param = |index: usize| params.get(index).and_then(number);

        match kind.as_slice() {
            b"XYZ" => View::Xyz {
                left: param(0),
                top: param(1),
                zoom: param(2),
            },
            b"FitH" => View::FitH { top: param(0) },
            b"FitV" => View::FitV { left: param(0) },
            b"FitR" => match (param(0), param(1), param(2), param(3)) {
                (Some(left), Some(bottom), Some(right), Some(top)) => View::FitR {
                    left,
                    bottom,
                    right,
                    top,
                },
                _ => View::Fit,
            },
            b"FitB" => View::FitB,
            b"FitBH" => View::FitBH { top: param(0) },
            b"FitBV" => View::FitBV { left: param(0) },
            _ => View::Fit,
        }
    }

    fn to_operands(self) -> Vec<Object> {
        let name = |name: &str| Object::Name(name.as_bytes().to_vec());
        let optional = |value: Option<f32>| value.map(Object::Real).unwrap_or(Object::Null);

        match self {
            View::Xyz { left, top, zoom } => {
                vec![name("XYZ"), optional(left), optional(top), optional(zoom)]
            }
            View::Fit => vec![name("Fit")],
            View::FitH { top } => vec![name("FitH"), optional(top)],
            View::FitV { left } => vec![name("FitV"), optional(left)],
            View::FitR {
                left,
                bottom,
                right,
                top,
            } => vec![
                name("FitR"),
                Object::Real(left),
                Object::Real(bottom),
                Object::Real(right),
                Object::Real(top),
            ],
            View::FitB => vec![name("FitB")],
            View::FitBH { top } => vec![name("FitBH"), optional(top)],
            View::FitBV { left } => vec![name("FitBV"), optional(left)],
        }
    }
}

/// Appearance of a bookmark in the navigation pane (`/C` and `/F` entries).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Style {
    pub color: Option<[f32; 3]>,
    pub italic: bool,
    pub bold: bool,
}

impl Style {
    fn flags(&self) -> i64 {
        let mut flags = 0;
        if self.italic {
            flags |= ITALIC_FLAG;
        }
        if self.bold {
            flags |= BOLD_FLAG;
        }
        flags
    }
}

/// One node of a document outline.
///
/// `page` is the zero-based position of the target page in the page tree of the
/// document owning the item, `None` when the item has no destination or its
/// destination does not lead to a page of that document.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    pub title: String,
    pub page: Option<u32>,
    pub view: View,
    pub style: Style,
    pub open: bool,
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    pub fn new(title: impl Into<String>, page: u32) -> Self {
        OutlineItem {
            title: title.into(),
            page: Some(page),
            view: View::default(),
            style: Style::default(),
            open: true,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineItem>) -> Self {
        self.children = children;
        self
    }

    /// Number of items in the subtree rooted at this item, the item included.
    pub fn item_count(&self) -> usize {
        1 + self.children.iter().map(OutlineItem::item_count).sum::<usize>()
    }

    /// Descendants shown when this item is expanded: every child, plus the
    /// visible descendants of the children which are expanded themselves.
    fn visible_descendants(&self) -> i64 {
        visible_count(&self.children)
    }
}

/// Reads the outline forest of `doc`. A document without `/Outlines` yields an
/// empty forest.
pub fn read_outline(doc: &Document) -> Result<Vec<OutlineItem>, OutlineError> {
    let mut reader = OutlineReader::new(doc);

    let Some(outlines) = reader.outline_root()? else {
        debug!("The document has no outline");
        return Ok(Vec::new());
    };

    match outlines.get(b"First") {
        Ok(first) => reader.read_siblings(first, 0),
        Err(_) => Ok(Vec::new()),
    }
}

struct OutlineReader<'a> {
    doc: &'a Document,
    page_indices: HashMap<ObjectId, u32>,
    page_count: u32,
    visited: HashSet<ObjectId>,
}

impl<'a> OutlineReader<'a> {
    fn new(doc: &'a Document) -> Self {
        let page_indices: HashMap<ObjectId, u32> = doc
            .get_pages()
            .into_iter()
            .map(|(page_number, page_id)| (page_id, page_number - 1))
            .collect();
        let page_count = page_indices.len() as u32;

        OutlineReader {
            doc,
            page_indices,
            page_count,
            visited: HashSet::new(),
        }
    }

    fn resolve(&self, object: &'a Object) -> Result<&'a Object, OutlineError> {
        match object {
            Object::Reference(id) => Ok(self.doc.get_object(*id)?),
            other => Ok(other),
        }
    }

    fn outline_root(&self) -> Result<Option<&'a Dictionary>, OutlineError> {
        let catalog = self.doc.catalog()?;
        let outlines = match catalog.get(b"Outlines") {
            Ok(outlines) => self.resolve(outlines)?,
            Err(_) => return Ok(None),
        };

        match outlines {
            Object::Null => Ok(None),
            Object::Dictionary(dict) => Ok(Some(dict)),
            _ => Err(OutlineError::MalformedOutline(
                "the /Outlines entry of the catalog is not a dictionary".to_string(),
            )),
        }
    }

    fn read_siblings(
        &mut self,
        first: &'a Object,
        depth: usize,
    ) -> Result<Vec<OutlineItem>, OutlineError> {
        if depth >= MAX_OUTLINE_DEPTH {
            return Err(too_deep());
        }

        let doc = self.doc;
        let mut items = Vec::new();
        let mut current = Some(first);

        while let Some(link) = current {
            let item_id = match link {
                Object::Reference(id) => *id,
                Object::Null => break,
                _ => {
                    return Err(OutlineError::MalformedOutline(
                        "an outline item is not an indirect object".to_string(),
                    ));
                }
            };

            if !self.visited.insert(item_id) {
                return Err(OutlineError::MalformedOutline(format!(
                    "the outline item {item_id:?} is reached twice"
                )));
            }

            let item_dict = doc.get_object(item_id)?.as_dict().map_err(|_| {
                OutlineError::MalformedOutline(format!(
                    "the outline item {item_id:?} is not a dictionary"
                ))
            })?;

            items.push(self.read_item(item_dict, depth)?);
            current = item_dict.get(b"Next").ok();
        }

        Ok(items)
    }

    fn read_item(
        &mut self,
        item_dict: &'a Dictionary,
        depth: usize,
    ) -> Result<OutlineItem, OutlineError> {
        let title = match item_dict.get(b"Title") {
            Ok(title) => decode_title(self.resolve(title)?),
            Err(_) => String::new(),
        };

        let (page, view) = match self.item_destination(item_dict)? {
            Some((page, view)) => (Some(page), view),
            None => (None, View::default()),
        };
        trace!("Read the outline item '{title}' pointing to the page index {page:?}");

        let children = match item_dict.get(b"First") {
            Ok(first) => self.read_siblings(first, depth + 1)?,
            Err(_) => Vec::new(),
        };

        // Leaves carry no /Count; they are considered open
        let count = item_dict.get(b"Count").and_then(Object::as_i64).ok();
        let open = children.is_empty() || count.is_none_or(|count| count > 0);

        Ok(OutlineItem {
            title,
            page,
            view,
            style: read_style(item_dict),
            open,
            children,
        })
    }

    /// `/Dest` takes precedence over a `/GoTo` action in `/A`.
    fn item_destination(
        &self,
        item_dict: &'a Dictionary,
    ) -> Result<Option<(u32, View)>, OutlineError> {
        if let Ok(dest) = item_dict.get(b"Dest") {
            return self.resolve_destination(dest, 0);
        }

        let Ok(action) = item_dict.get(b"A") else {
            return Ok(None);
        };
        let Ok(action) = self.resolve(action)?.as_dict() else {
            return Ok(None);
        };

        let is_goto = action
            .get(b"S")
            .and_then(Object::as_name)
            .is_ok_and(|kind| kind == b"GoTo");
        match action.get(b"D") {
            Ok(dest) if is_goto => self.resolve_destination(dest, 0),
            _ => Ok(None),
        }
    }

    fn resolve_destination(
        &self,
        dest: &'a Object,
        indirections: u8,
    ) -> Result<Option<(u32, View)>, OutlineError> {
        if indirections > MAX_DESTINATION_INDIRECTIONS {
            return Ok(None);
        }

        match self.resolve(dest)? {
            Object::Array(array) => Ok(self.explicit_destination(array)),
            Object::Dictionary(dict) => match dict.get(b"D") {
                Ok(dest) => self.resolve_destination(dest, indirections + 1),
                Err(_) => Ok(None),
            },
            Object::Name(name) | Object::String(name, _) => {
                match self.named_destination(name)? {
                    Some(dest) => self.resolve_destination(dest, indirections + 1),
                    None => {
                        debug!(
                            "The named destination '{}' is not defined",
                            String::from_utf8_lossy(name)
                        );
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    fn explicit_destination(&self, array: &[Object]) -> Option<(u32, View)> {
        let (target, operands) = array.split_first()?;

        let page = match target {
            Object::Reference(page_id) => *self.page_indices.get(page_id)?,
            Object::Integer(index) => u32::try_from(*index)
                .ok()
                .filter(|index| *index < self.page_count)?,
            _ => return None,
        };

        Some((page, View::from_operands(operands)))
    }

    /// Looks the name up in the `/Names /Dests` name tree first, then in the
    /// older `/Dests` dictionary of the catalog.
    fn named_destination(&self, name: &[u8]) -> Result<Option<&'a Object>, OutlineError> {
        let catalog = self.doc.catalog()?;

        if let Ok(names) = catalog.get(b"Names")
            && let Ok(names) = self.resolve(names)?.as_dict()
            && let Ok(tree) = names.get(b"Dests")
            && let Some(dest) = self.search_name_tree(tree, name, 0)?
        {
            return Ok(Some(dest));
        }

        if let Ok(dests) = catalog.get(b"Dests")
            && let Ok(dests) = self.resolve(dests)?.as_dict()
            && let Ok(dest) = dests.get(name)
        {
            return Ok(Some(dest));
        }

        Ok(None)
    }

    fn search_name_tree(
        &self,
        node: &'a Object,
        name: &[u8],
        depth: u8,
    ) -> Result<Option<&'a Object>, OutlineError> {
        if depth > MAX_NAME_TREE_DEPTH {
            return Err(OutlineError::MalformedOutline(
                "the name tree of the destinations is too deep".to_string(),
            ));
        }

        let Ok(node) = self.resolve(node)?.as_dict() else {
            return Ok(None);
        };

        if let Ok(pairs) = node.get(b"Names")
            && let Object::Array(pairs) = self.resolve(pairs)?
        {
            for pair in pairs.chunks_exact(2) {
                if let Object::String(key, _) = self.resolve(&pair[0])?
                    && key.as_slice() == name
                {
                    return Ok(Some(&pair[1]));
                }
            }
        }

        if let Ok(kids) = node.get(b"Kids")
            && let Object::Array(kids) = self.resolve(kids)?
        {
            for kid in kids {
                if let Some(dest) = self.search_name_tree(kid, name, depth + 1)? {
                    return Ok(Some(dest));
                }
            }
        }

        Ok(None)
    }
}

fn read_style(item_dict: &Dictionary) -> Style {
    let color = match item_dict.get(b"C") {
        Ok(Object::Array(rgb)) => match rgb.as_slice() {
            [r, g, b] => match (number(r), number(g), number(b)) {
                (Some(r), Some(g), Some(b)) => Some([r, g, b]),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    };
    let flags = item_dict.get(b"F").and_then(Object::as_i64).unwrap_or(0);

    Style {
        color,
        italic: flags & ITALIC_FLAG != 0,
        bold: flags & BOLD_FLAG != 0,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Title of an outline item. Text strings lopdf cannot decode are read as
/// lossy UTF-8.
fn decode_title(title: &Object) -> String {
    match lopdf::decode_text_string(title) {
        Ok(title) => title,
        Err(_) => match title {
            Object::String(bytes, _) => String::from_utf8_lossy(bytes).into_owned(),
            _ => String::new(),
        },
    }
}

fn too_deep() -> OutlineError {
    OutlineError::MalformedOutline(format!(
        "the outline is nested deeper than {MAX_OUTLINE_DEPTH} levels"
    ))
}

/// Items shown at the level of `items` and below when every expanded item is
/// displayed, i.e. the `/Count` of their parent.
fn visible_count(items: &[OutlineItem]) -> i64 {
    items
        .iter()
        .map(|item| 1 + if item.open { item.visible_descendants() } else { 0 })
        .sum()
}

/// Appends `items` after the existing top-level items of the outline of `doc`,
/// creating the outline root if the document has none. Existing items are only
/// touched to link the last of them to the first appended item.
///
/// Items are validated before anything is written: on error `doc` is unchanged.
pub fn append_outline(doc: &mut Document, items: &[OutlineItem]) -> Result<(), OutlineError> {
    if items.is_empty() {
        return Ok(());
    }

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    check_items(items, page_ids.len())?;

    let outlines_id = get_or_create_outline_root(doc)?;

    let (previous_first, previous_last, previous_count) = {
        let outlines = doc.get_object(outlines_id)?.as_dict()?;
        (
            outlines.get(b"First").and_then(Object::as_reference).ok(),
            outlines.get(b"Last").and_then(Object::as_reference).ok(),
            outlines.get(b"Count").and_then(Object::as_i64).ok(),
        )
    };

    let previous_last = match (previous_first, previous_last) {
        (_, Some(last)) => Some(last),
        (Some(first), None) => Some(last_sibling(doc, first)?),
        (None, None) => None,
    };
    let previous_count = match previous_count {
        Some(count) => count.abs(),
        None => visible_count(&read_outline(doc)?),
    };

    let Some((first_id, last_id)) = write_siblings(doc, items, outlines_id, &page_ids) else {
        return Ok(());
    };

    if let Some(previous_last) = previous_last {
        doc.get_object_mut(previous_last)?
            .as_dict_mut()?
            .set("Next", first_id);
        doc.get_object_mut(first_id)?
            .as_dict_mut()?
            .set("Prev", previous_last);
    }

    let outlines = doc.get_object_mut(outlines_id)?.as_dict_mut()?;
    if previous_last.is_none() {
        outlines.set("First", first_id);
    }
    outlines.set("Last", last_id);
    outlines.set(
        "Count",
        Object::Integer(previous_count + visible_count(items)),
    );

    let catalog = doc.catalog_mut()?;
    if !catalog.has(b"PageMode") {
        catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));
    }

    debug!(
        "Appended {} outline items to the outline root {outlines_id:?}",
        items.iter().map(OutlineItem::item_count).sum::<usize>()
    );

    Ok(())
}

/// Checks the nesting depth and the target pages of `items` without recursion.
fn check_items(items: &[OutlineItem], page_count: usize) -> Result<(), OutlineError> {
    let mut pending: Vec<(&OutlineItem, usize)> = items.iter().map(|item| (item, 0)).collect();

    while let Some((item, depth)) = pending.pop() {
        if depth >= MAX_OUTLINE_DEPTH {
            return Err(too_deep());
        }

        if let Some(page) = item.page
            && page as usize >= page_count
        {
            return Err(OutlineError::PageOutOfRange {
                title: item.title.clone(),
                page: i64::from(page),
                page_count,
            });
        }

        pending.extend(item.children.iter().map(|child| (child, depth + 1)));
    }

    Ok(())
}

/// Follows `/Next` from `first`, for outline roots missing their `/Last` entry.
fn last_sibling(doc: &Document, first: ObjectId) -> Result<ObjectId, OutlineError> {
    let mut visited = HashSet::new();
    let mut current = first;

    loop {
        if !visited.insert(current) {
            return Err(OutlineError::MalformedOutline(format!(
                "the outline item {current:?} is reached twice"
            )));
        }

        match doc.get_object(current)?.as_dict()?.get(b"Next") {
            Ok(Object::Reference(next)) => current = *next,
            _ => return Ok(current),
        }
    }
}

fn get_or_create_outline_root(doc: &mut Document) -> Result<ObjectId, OutlineError> {
    let existing = doc.catalog()?.get(b"Outlines").ok().cloned();

    match existing {
        Some(Object::Reference(outlines_id)) => {
            if doc.get_object(outlines_id)?.as_dict().is_err() {
                return Err(OutlineError::MalformedOutline(
                    "the /Outlines entry of the catalog is not a dictionary".to_string(),
                ));
            }
            Ok(outlines_id)
        }
        // Items need an indirect parent to point to
        Some(Object::Dictionary(outlines)) => {
            let outlines_id = doc.add_object(outlines);
            doc.catalog_mut()?.set("Outlines", outlines_id);
            Ok(outlines_id)
        }
        _ => {
            let outlines_id = doc.add_object(dictionary! {
                "Type" => "Outlines",
                "Count" => Object::Integer(0),
            });
            doc.catalog_mut()?.set("Outlines", outlines_id);
            Ok(outlines_id)
        }
    }
}

/// Writes `items`, already checked by `check_items`, as a linked list of
/// siblings under `parent` and returns the ids of the first and last of them.
fn write_siblings(
    doc: &mut Document,
    items: &[OutlineItem],
    parent: ObjectId,
    page_ids: &[ObjectId],
) -> Option<(ObjectId, ObjectId)> {
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();

    for (index, (item, &item_id)) in items.iter().zip(&ids).enumerate() {
        let mut item_dict = dictionary! {
            "Title" => lopdf::text_string(&item.title),
            "Parent" => parent,
        };

        if index > 0 {
            item_dict.set("Prev", ids[index - 1]);
        }
        if let Some(&next) = ids.get(index + 1) {
            item_dict.set("Next", next);
        }

        if let Some(page_id) = item.page.and_then(|page| page_ids.get(page as usize)) {
            let mut dest = vec![Object::Reference(*page_id)];
            dest.extend(item.view.to_operands());
            item_dict.set("Dest", dest);
        }

        if let Some(rgb) = item.style.color {
            item_dict.set("C", rgb.map(Object::Real).to_vec());
        }
        let flags = item.style.flags();
        if flags != 0 {
            item_dict.set("F", Object::Integer(flags));
        }

        if let Some((first, last)) = write_siblings(doc, &item.children, item_id, page_ids) {
            let visible = item.visible_descendants();
            item_dict.set("First", first);
            item_dict.set("Last", last);
            item_dict.set(
                "Count",
                Object::Integer(if item.open { visible } else { -visible }),
            );
        }

        doc.objects.insert(item_id, Object::Dictionary(item_dict));
    }

    ids.first().copied().zip(ids.last().copied())
}
