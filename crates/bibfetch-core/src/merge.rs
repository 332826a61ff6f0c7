//! Concatenating downloaded PDFs into one combined file.

use std::path::{Path, PathBuf};

/// Page attributes a `Page` may inherit from its ancestors in the page tree.
#[cfg(feature = "merge")]
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy of a page dictionary carrying every inheritable attribute itself, so
/// the page no longer depends on its original `Pages` ancestors.
#[cfg(feature = "merge")]
fn detach_page(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> Option<lopdf::Dictionary> {
    use lopdf::Object;

    let mut page = doc.get_dictionary(page_id).ok()?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        let Ok(node) = doc.get_dictionary(id) else { break };
        for key in INHERITABLE {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 64 {
            break;
        }
    }
    Some(page)
}

/// Merge `inputs` (in order) into `output`. Returns the number of pages written.
///
/// Inputs that fail to load are skipped with a warning; it is an error only
/// when nothing could be loaded.
#[cfg(feature = "merge")]
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<usize, String> {
    use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut merged = Document::with_version("1.5");
    let mut loaded = 0usize;

    for path in inputs {
        let mut doc = match Document::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable PDF in merge");
                continue;
            }
        };
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            if let Some(page) = detach_page(&doc, page_id) {
                pages.push((page_id, page));
            }
        }
        for (id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
        loaded += 1;
    }

    if loaded == 0 || pages.is_empty() {
        return Err("none of the downloaded PDFs could be read".into());
    }

    let pages_id = (max_id, 0);
    let catalog_id = (max_id + 1, 0);
    let page_count = pages.len();
    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    for (id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        merged.objects.insert(id, Object::Dictionary(page));
    }

    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = catalog_id.0;
    merged.renumber_objects();
    merged.compress();
    merged.save(output).map_err(|e| e.to_string())?;

    tracing::info!(path = %output.display(), files = loaded, pages = page_count, "combined PDF written");
    Ok(page_count)
}

#[cfg(not(feature = "merge"))]
pub fn merge_pdfs(_inputs: &[PathBuf], _output: &Path) -> Result<usize, String> {
    Err("PDF merging is not available in this build".into())
}

#[cfg(all(test, feature = "merge"))]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Write a minimal one-page PDF whose font and media box live on the
    /// `Pages` node rather than the page.
    fn write_single_page(path: &Path, text: &str, base_font: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    /// BaseFont behind `F1` in the page's own resources.
    fn page_font(doc: &Document, page_id: lopdf::ObjectId) -> String {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = match page.get(b"Resources").unwrap() {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            Object::Dictionary(dict) => dict,
            other => panic!("Resources is not a dictionary: {:?}", other),
        };
        let fonts = match resources.get(b"Font").unwrap() {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            Object::Dictionary(dict) => dict,
            other => panic!("Font is not a dictionary: {:?}", other),
        };
        let font_id = fonts.get(b"F1").unwrap().as_reference().unwrap();
        let font = doc.get_dictionary(font_id).unwrap();
        String::from_utf8_lossy(font.get(b"BaseFont").unwrap().as_name().unwrap()).into_owned()
    }

    #[test]
    fn merges_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        write_single_page(&a, "first", "Helvetica");
        write_single_page(&b, "second", "Courier");

        let out = dir.path().join("combined.pdf");
        let pages = merge_pdfs(&[a, b], &out).unwrap();
        assert_eq!(pages, 2);

        let doc = Document::load(&out).unwrap();
        let page_ids: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 2);
        assert_eq!(page_font(&doc, page_ids[0]), "Helvetica");
        assert_eq!(page_font(&doc, page_ids[1]), "Courier");
    }

    #[test]
    fn inherited_attributes_move_onto_pages() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        write_single_page(&a, "first", "Helvetica");
        write_single_page(&b, "second", "Times-Roman");

        let out = dir.path().join("combined.pdf");
        merge_pdfs(&[a, b], &out).unwrap();

        let doc = Document::load(&out).unwrap();
        for page_id in doc.get_pages().into_values() {
            let page = doc.get_dictionary(page_id).unwrap();
            assert!(page.has(b"MediaBox"));
            let root = page.get(b"Parent").unwrap().as_reference().unwrap();
            let root = doc.get_dictionary(root).unwrap();
            assert!(!root.has(b"Resources"));
            assert!(!root.has(b"MediaBox"));
            assert_eq!(root.get(b"Count").unwrap().as_i64().unwrap(), 2);
        }
    }

    #[test]
    fn unreadable_inputs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        write_single_page(&good, "ok", "Courier");
        std::fs::write(&bad, b"not a pdf").unwrap();

        let out = dir.path().join("combined.pdf");
        assert_eq!(merge_pdfs(&[bad.clone(), good], &out).unwrap(), 1);
        assert!(merge_pdfs(&[bad], &dir.path().join("none.pdf")).is_err());
    }
}
