//! Slide deck extractor for Office Open XML presentations.
//!
//! A `.pptx` file is a zip archive. Slide order comes from the `p:sldIdLst` of
//! `ppt/presentation.xml`, resolved to part names through the presentation relationships.

use super::{DocumentFormat, ExtractError, ExtractedUnit};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";
/// Ceiling on the decompressed size of any single XML part.
const MAX_PART_BYTES: u64 = 32 * 1024 * 1024;

/// Extract one unit per slide, in presentation order.
pub(super) fn extract<R: Read + Seek>(reader: R) -> Result<Vec<ExtractedUnit>, ExtractError> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|error| failed(format!("not a zip archive: {error}")))?;

    let relationships = parse_relationships(&read_part(&mut archive, PRESENTATION_RELS_PART)?)?;
    let slide_ids = parse_slide_ids(&read_part(&mut archive, PRESENTATION_PART)?)?;

    let mut units = Vec::with_capacity(slide_ids.len());
    for (position, relationship_id) in slide_ids.iter().enumerate() {
        let target = relationships
            .get(relationship_id)
            .ok_or_else(|| failed(format!("slide relationship '{relationship_id}' is missing")))?;
        let part = resolve_part_name(target);
        let shapes = parse_slide_shapes(&read_part(&mut archive, &part)?)
            .map_err(|error| failed(format!("{part}: {error}")))?;
        units.push(ExtractedUnit::from_elements(position + 1, shapes));
    }

    Ok(units)
}

fn failed(reason: impl std::fmt::Display) -> ExtractError {
    ExtractError::failed(DocumentFormat::SlideDeck, reason)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractError> {
    read_part_within(archive, name, MAX_PART_BYTES)
}

/// Read a part, refusing to inflate more than `limit` bytes whatever its header claims.
fn read_part_within<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<String, ExtractError> {
    let file = archive
        .by_name(name)
        .map_err(|error| failed(format!("part '{name}' not found: {error}")))?;
    let too_large = || failed(format!("part '{name}' exceeds {limit} bytes when decompressed"));
    if file.size() > limit {
        return Err(too_large());
    }

    let mut content = String::new();
    file.take(limit + 1)
        .read_to_string(&mut content)
        .map_err(|error| failed(format!("failed to read '{name}': {error}")))?;
    if content.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(content)
}

/// Map relationship ids to their targets.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map_err(|error| failed(format!("relationships: {error}")))?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value.into_owned()),
                        b"Target" => target = Some(value.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    relationships.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(failed(format!("relationships: {error}"))),
            _ => {}
        }
    }

    Ok(relationships)
}

/// Collect the relationship ids of `p:sldId` entries in presentation order.
fn parse_slide_ids(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"sldId" =>
            {
                if let Some(id) = relationship_attribute(e)? {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(failed(format!("presentation: {error}"))),
            _ => {}
        }
    }

    Ok(ids)
}

/// The namespaced `r:id` attribute, as opposed to the numeric `id`.
fn relationship_attribute(element: &BytesStart<'_>) -> Result<Option<String>, ExtractError> {
    for attr in element.attributes().flatten() {
        if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
            let value = attr
                .unescape_value()
                .map_err(|error| failed(format!("presentation: {error}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn resolve_part_name(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        format!("ppt/{target}")
    }
}

#[derive(Default)]
struct ShapeText {
    has_text_frame: bool,
    paragraphs: Vec<String>,
}

impl ShapeText {
    fn push(&mut self, text: &str) {
        match self.paragraphs.last_mut() {
            Some(paragraph) => paragraph.push_str(text),
            None => self.paragraphs.push(text.to_string()),
        }
    }
}

/// Text of every `p:sp` shape carrying a text body, in document order.
///
/// Shapes nested in group shapes are visited in place. Tables and pictures have no text frame
/// and are skipped.
fn parse_slide_shapes(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();
    let mut current: Option<ShapeText> = None;
    let mut in_text_body = false;
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"sp" => current = Some(ShapeText::default()),
                b"txBody" => {
                    if let Some(shape) = current.as_mut() {
                        shape.has_text_frame = true;
                        in_text_body = true;
                    }
                }
                b"p" if in_text_body => {
                    if let Some(shape) = current.as_mut() {
                        shape.paragraphs.push(String::new());
                    }
                }
                b"t" if in_text_body => in_run_text = true,
                _ => {}
            },
            Event::Empty(ref e) if in_text_body => {
                if let Some(shape) = current.as_mut() {
                    match e.local_name().as_ref() {
                        b"p" => shape.paragraphs.push(String::new()),
                        b"br" => shape.push("\n"),
                        b"tab" => shape.push("\t"),
                        _ => {}
                    }
                }
            }
            Event::Text(ref e) if in_run_text => {
                if let Some(shape) = current.as_mut() {
                    shape.push(&e.unescape()?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"txBody" => in_text_body = false,
                b"sp" => {
                    if let Some(shape) = current.take() {
                        if shape.has_text_frame {
                            shapes.push(shape.paragraphs.join("\n"));
                        }
                    }
                    in_text_body = false;
                    in_run_text = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}
