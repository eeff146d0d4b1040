#![allow(dead_code)]

use async_trait::async_trait;
use docbrief::pipeline::{ChunkBudget, PipelineSettings, SummaryPipeline};
use docbrief::summarization::{GenerationError, TextGenerator};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary, encryption};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Contents of one fixture slide: the text of each text-bearing shape, or a picture-only slide.
pub enum SlideFixture<'a> {
    Shapes(&'a [&'a str]),
    PictureOnly,
}

const PRESENTATION_NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

/// Build a minimal `.pptx` archive in memory.
pub fn deck(slides: &[SlideFixture<'_>]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    let mut ids = String::new();
    let mut rels = String::new();
    for position in 1..=slides.len() {
        ids.push_str(&format!(
            r#"<p:sldId id="{}" r:id="rId{}"/>"#,
            255 + position,
            position + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{position}.xml"/>"#,
            position + 1
        ));
    }

    write_part(
        &mut zip,
        options,
        "ppt/presentation.xml",
        &format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation {PRESENTATION_NS}><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#),
    );
    write_part(
        &mut zip,
        options,
        "ppt/_rels/presentation.xml.rels",
        &format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#),
    );

    for (position, slide) in slides.iter().enumerate() {
        let body = match slide {
            SlideFixture::Shapes(texts) => texts
                .iter()
                .map(|text| {
                    format!(
                        "<p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>",
                        escape(text)
                    )
                })
                .collect::<String>(),
            SlideFixture::PictureOnly => "<p:pic><p:blipFill/></p:pic>".to_string(),
        };
        write_part(
            &mut zip,
            options,
            &format!("ppt/slides/slide{}.xml", position + 1),
            &format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld {PRESENTATION_NS}><p:cSld><p:spTree>{body}</p:spTree></p:cSld></p:sld>"#),
        );
    }

    zip.finish().expect("finish zip").into_inner()
}

fn write_part(zip: &mut ZipWriter<Cursor<Vec<u8>>>, options: FileOptions, name: &str, xml: &str) {
    zip.start_file(name, options).expect("start part");
    zip.write_all(xml.as_bytes()).expect("write part");
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build a PDF with one page per entry; `None` produces a page without text.
pub fn pdf(pages: &[Option<&str>]) -> Vec<u8> {
    save(pdf_document(pages))
}

/// RC4-40 encrypted PDF whose user password is empty, as produced by "restrict editing" tools.
pub fn owner_protected_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    save(encrypted(pdf_document(pages), None))
}

/// RC4-40 encrypted PDF that cannot be opened without a user password.
pub fn user_protected_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    save(encrypted(pdf_document(pages), Some(vec![0xA5u8; 32])))
}

fn encrypted(mut doc: Document, user_entry: Option<Vec<u8>>) -> Document {
    let mut settings = dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::string_literal(vec![0x5Au8; 32]),
        "P" => -4,
    };
    // Without /U any user password is accepted; a bogus /U rejects the empty one.
    if let Some(user_entry) = user_entry {
        settings.set("U", Object::string_literal(user_entry));
    }
    let encrypt_id = doc.add_object(settings);
    let file_id: Vec<Object> = vec![
        Object::string_literal(b"docbrief-fixture".to_vec()),
        Object::string_literal(b"docbrief-fixture".to_vec()),
    ];
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set("ID", file_id);

    let key = encryption::get_encryption_key(&doc, "", false).expect("derive key");
    for (&id, object) in doc.objects.iter_mut() {
        if id == encrypt_id {
            continue;
        }
        // RC4 is symmetric, so the decryption routine encrypts as well.
        let Ok(cipher) = encryption::decrypt_object(&key, id, object) else {
            continue;
        };
        match object {
            Object::Stream(stream) => stream.set_content(cipher),
            Object::String(content, _) => *content = cipher,
            _ => {}
        }
    }
    doc
}

fn pdf_document(pages: &[Option<&str>]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
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

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let operations = match page {
            Some(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            None => Vec::new(),
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let media_box: Vec<Object> = vec![0.into(), 0.into(), 612.into(), 792.into()];
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages.len() as i64,
        "MediaBox" => media_box,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

type Script = dyn Fn(&str, u32) -> Result<String, GenerationError> + Send + Sync;

/// Generator driven by a closure of `(chunk text, attempt number for that chunk)`.
pub struct ScriptedGenerator {
    script: Box<Script>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedGenerator {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, u32) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    /// Summaries that echo the chunk in a recognizable form.
    pub fn echo() -> Arc<Self> {
        Self::new(|chunk, _| Ok(format!("Summary of: {}", chunk.replace('\n', " "))))
    }

    pub fn total_calls(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, needle: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(chunk, _)| chunk.contains(needle))
            .map(|(_, count)| *count)
            .sum()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _max_output_tokens: u32,
        _temperature: f32,
    ) -> Result<String, GenerationError> {
        let chunk = prompt
            .split_once("\n\n")
            .map(|(_, chunk)| chunk)
            .unwrap_or(prompt)
            .to_string();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(chunk.clone()).or_insert(0);
            *count += 1;
            *count
        };
        (self.script)(&chunk, attempt)
    }
}

/// Pipeline with fast retries and the given character budget.
pub fn pipeline(
    upload_dir: &Path,
    budget: usize,
    generator: Arc<ScriptedGenerator>,
) -> SummaryPipeline {
    let mut settings = PipelineSettings::new(upload_dir);
    settings.chunk_budget = ChunkBudget::Characters(budget);
    settings.retry.initial_backoff = Duration::from_millis(1);
    settings.retry.max_backoff = Duration::from_millis(5);
    SummaryPipeline::new(settings, generator)
}

pub fn server_error() -> GenerationError {
    GenerationError::Server {
        status: 503,
        message: "temporarily unavailable".into(),
    }
}
