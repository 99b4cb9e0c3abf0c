//! Shared helpers for integration tests.
#![allow(dead_code)]

use lazy_static::lazy_static;
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};
use pdf_seal::pdf::SignatureStamp;
use pdf_seal::{EngineConfig, KeyMaterialStore, SignatureEngine};
use std::sync::Arc;
use tempfile::TempDir;

lazy_static! {
    // RSA key generation is slow; every test in a binary shares one key directory
    static ref SHARED: (TempDir, Arc<KeyMaterialStore>) = {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = EngineConfig::new().with_key_dir(dir.path());
        let store = Arc::new(KeyMaterialStore::open(config).expect("open store"));
        (dir, store)
    };
}

/// Store shared by every test in this binary.
pub fn shared_store() -> Arc<KeyMaterialStore> {
    SHARED.1.clone()
}

/// Engine over the shared store.
pub fn shared_engine() -> SignatureEngine {
    SignatureEngine::new(shared_store())
}

/// Fresh store in its own directory, for tests that need isolation.
pub fn fresh_store(config: EngineConfig) -> (TempDir, Arc<KeyMaterialStore>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = KeyMaterialStore::open(config.with_key_dir(dir.path())).expect("open store");
    (dir, Arc::new(store))
}

/// A small text-only stamp.
pub fn sample_stamp() -> SignatureStamp {
    let at = chrono::NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap();
    SignatureStamp::new(vec!["Name: Test Signer".to_string(), "ID: 000.000.000-00".to_string()], at)
}

/// Build a synthetic PDF with `pages` pages of text.
pub fn synthetic_pdf(pages: usize) -> Vec<u8> {
    save(synthetic_document(pages))
}

/// Synthetic single-page PDF whose trailer references an `/Encrypt` dictionary.
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = synthetic_document(1);
    let mut encrypt = Dictionary::new();
    encrypt.set("Filter", Object::Name(b"Standard".to_vec()));
    encrypt.set("V", Object::Integer(1));
    encrypt.set("R", Object::Integer(2));
    encrypt.set("P", Object::Integer(-44));
    let encrypt_id = doc.add_object(encrypt);
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    save(doc)
}

fn synthetic_document(pages: usize) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    let font_id = doc.add_object(font);

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));

    let mut kids = Vec::new();
    for n in 0..pages {
        let text = format!("BT /F1 12 Tf 72 720 Td (Synthetic page {}) Tj ET", n + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), text.into_bytes()));

        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts.clone()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set("Resources", Object::Dictionary(resources));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(pages as i64));
    pages_dict.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);

    let mut info = Dictionary::new();
    info.set("Title", Object::String(b"Synthetic".to_vec(), StringFormat::Literal));
    let info_id = doc.add_object(info);

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save synthetic PDF");
    out
}

/// Index of a byte inside the page content of `pdf`, away from any metadata.
pub fn body_offset(pdf: &[u8]) -> usize {
    let needle = b"Synthetic page 1";
    pdf.windows(needle.len())
        .position(|w| w == needle)
        .expect("page text present")
}
