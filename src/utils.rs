use crate::outline::{self, OutlineItem};
use anyhow::{Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};

/// Get a PDF file with minimal features
pub fn get_basic_pdf_doc(doc_name: &str, num_pages: u8) -> Result<Document> {
    if doc_name.contains('/') {
        return Err(anyhow!(
            "The document name provided contains a '/', not allowed!"
        ));
    }

    let mut doc = Document::with_version("1.7");

    let pages_root_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
    });

    let pages_ids: Vec<_> = (1..=num_pages)
        .map(|page_number| {
            append_random_page_to_doc(page_number, num_pages, doc_name, &pages_root_id, &mut doc)
        })
        .collect::<Result<_>>()?;

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => pages_ids.iter().map(|&page_id| page_id.into()).collect::<Vec<_>>(),
        "Count" => num_pages,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };

    doc.objects.insert(pages_root_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_root_id,
    });

    doc.trailer.set("Root", catalog_id);

    Ok(doc)
}

/// Get a PDF file with minimal features whose outline is `items`
pub fn get_basic_pdf_doc_with_outline(
    doc_name: &str,
    num_pages: u8,
    items: &[OutlineItem],
) -> Result<Document> {
    let mut doc = get_basic_pdf_doc(doc_name, num_pages)?;
    outline::append_outline(&mut doc, items)?;

    Ok(doc)
}

/// One top-level bookmark `Page k` per page of the document.
pub fn trivial_outline(num_pages: u8) -> Vec<OutlineItem> {
    (0..u32::from(num_pages))
        .map(|page_index| OutlineItem::new(format!("Page {}", page_index + 1), page_index))
        .collect()
}

/// Installs `items` verbatim as the top-level outline items of `doc`, only
/// adding the `/Parent`, `/Prev` and `/Next` links. Meant to craft outlines
/// that `outline::append_outline` would never write.
pub fn equip_with_raw_outline_items(doc: &mut Document, items: Vec<Dictionary>) -> Result<()> {
    if doc.catalog()?.has(b"Outlines") {
        return Err(anyhow!("An outline is already present on such document"));
    }

    let outlines_id = doc.new_object_id();
    let items_ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();

    let first_item_id = *items_ids
        .first()
        .ok_or(anyhow!("No outline items were provided"))?;
    let last_item_id = *items_ids
        .last()
        .ok_or(anyhow!("No outline items were provided"))?;

    for (index, mut item) in items.into_iter().enumerate() {
        item.set("Parent", outlines_id);
        if index > 0 {
            item.set("Prev", items_ids[index - 1]);
        }
        if let Some(&next) = items_ids.get(index + 1) {
            item.set("Next", next);
        }
        doc.objects.insert(items_ids[index], Object::Dictionary(item));
    }

    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first_item_id,
            "Last" => last_item_id,
            "Count" => Object::Integer(items_ids.len() as i64),
        }),
    );
    doc.catalog_mut()?.set("Outlines", outlines_id);

    Ok(())
}

fn append_random_page_to_doc(
    page_number: u8,
    total_num_pages: u8,
    doc_name: &str,
    pages_id: &ObjectId,
    doc: &mut Document,
) -> Result<ObjectId> {
    use lopdf::{
        Stream,
        content::{Content, Operation},
    };

    let page_title = format!("Page {page_number} of {total_num_pages}");
    let random_text = craft_random_text_of_len(20);

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![50.into(), 600.into()]),
            Operation::new("TL", vec![50.into()]),
            Operation::new("Tf", vec!["F1".into(), 46.into()]),
            Operation::new("Tj", vec![Object::string_literal(doc_name)]),
            Operation::new("Tf", vec!["F1".into(), 36.into()]),
            Operation::new("'", vec![Object::string_literal(page_title)]),
            Operation::new("Tf", vec!["F1".into(), 20.into()]),
            Operation::new("'", vec![Object::string_literal(random_text)]),
            Operation::new("ET", vec![]),
        ],
    };

    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => *pages_id,
        "Contents" => content_id,
    });

    Ok(page_id)
}

pub fn craft_random_text_of_len(char_length: usize) -> String {
    use rand::distr::{Alphanumeric, SampleString};
    Alphanumeric.sample_string(&mut rand::rng(), char_length)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_doc_10_pages() -> Result<()> {
        let document = get_basic_pdf_doc("doc_name", 10)?;
        let len = document.get_pages().len();

        assert_eq!(len, 10);

        Ok(())
    }

    #[test]
    fn doc_with_trivial_outline_bookmarks_every_page() -> Result<()> {
        let document = get_basic_pdf_doc_with_outline("doc_name", 4, &trivial_outline(4))?;
        let items = outline::read_outline(&document)?;

        let pages: Vec<_> = items.iter().map(|item| item.page).collect();
        assert_eq!(pages, vec![Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(items[3].title, "Page 4");

        Ok(())
    }

    #[test]
    fn raw_items_refused_on_doc_with_outline() -> Result<()> {
        let mut document = get_basic_pdf_doc_with_outline("doc_name", 2, &trivial_outline(2))?;

        let result = equip_with_raw_outline_items(
            &mut document,
            vec![dictionary! { "Title" => Object::string_literal("Extra") }],
        );
        assert!(result.is_err());

        Ok(())
    }
}
