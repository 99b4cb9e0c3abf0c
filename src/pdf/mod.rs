//! PDF handling: visual stamps and signature metadata.
//!
//! `lopdf` parses documents and rewrites them for stamping. Signature metadata
//! is written as a hand-built incremental update so that the reserved block's
//! byte offsets are known exactly.

mod incremental;
pub mod metadata;
mod serializer;
pub mod stamp;

pub use metadata::{EmbeddedSignature, MetadataEmbedder, PreparedDocument};
pub use stamp::{PageStamper, SignatureStamp, StampImage, StampPosition, Stamper};

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

    /// Build an uncompressed document with `pages` pages of text and a titled Info dictionary.
    pub fn pdf_with_pages(title: &str, pages: usize) -> Vec<u8> {
        save(document(title, pages))
    }

    fn document(title: &str, pages: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        let font_id = doc.add_object(font);

        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));
        let resources_id = doc.add_object(resources);

        let mut kids = Vec::new();
        for n in 0..pages {
            let text = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", n + 1);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), text.into_bytes()));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Contents", Object::Reference(content_id));
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Count", Object::Integer(pages as i64));
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Resources", Object::Reference(resources_id));
        pages_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ]),
        );
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);

        let mut info = Dictionary::new();
        info.set("Title", Object::String(title.as_bytes().to_vec(), StringFormat::Literal));
        info.set("Producer", Object::String(b"fixture".to_vec(), StringFormat::Literal));
        let info_id = doc.add_object(info);

        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.trailer.set("Info", Object::Reference(info_id));
        doc
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// Single-page document whose trailer references a standard security handler.
    pub fn encrypted_pdf() -> Vec<u8> {
        let mut doc = document("Encrypted", 1);

        let mut encrypt = Dictionary::new();
        encrypt.set("Filter", Object::Name(b"Standard".to_vec()));
        encrypt.set("V", Object::Integer(1));
        encrypt.set("R", Object::Integer(2));
        encrypt.set("O", Object::String(vec![0x28; 32], StringFormat::Hexadecimal));
        encrypt.set("U", Object::String(vec![0x4e; 32], StringFormat::Hexadecimal));
        encrypt.set("P", Object::Integer(-44));
        let encrypt_id = doc.add_object(encrypt);
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));

        save(doc)
    }

    pub fn simple_pdf(title: &str) -> Vec<u8> {
        pdf_with_pages(title, 1)
    }

    pub fn multi_page_pdf(pages: usize) -> Vec<u8> {
        pdf_with_pages("Multi", pages)
    }
}
