//! OOXML package access: read every part, swap some, write them back

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::TemplateError;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const STYLES_PART: &str = "xl/styles.xml";

enum Entry {
    Directory(String),
    File(String, Vec<u8>),
}

/// All parts of a spreadsheet package, in archive order
pub struct Package {
    entries: Vec<Entry>,
}

impl Package {
    /// Read every part of a zip container into memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| TemplateError::Unreadable(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if file.is_dir() {
                entries.push(Entry::Directory(name));
                continue;
            }
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .with_context(|| format!("Failed to read part '{}'", name))?;
            entries.push(Entry::File(name, buffer));
        }

        let package = Self { entries };
        if package.part(WORKBOOK_PART).is_none() {
            return Err(TemplateError::Unreadable(format!("missing {}", WORKBOOK_PART)).into());
        }
        Ok(package)
    }

    /// Get a part's bytes by name
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries.iter().find_map(|e| match e {
            Entry::File(n, data) if n == name => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Get a part as UTF-8 text
    pub fn part_str(&self, name: &str) -> Result<&str> {
        let data = self
            .part(name)
            .ok_or_else(|| TemplateError::Unreadable(format!("missing {}", name)))?;
        std::str::from_utf8(data).with_context(|| format!("Part '{}' is not UTF-8", name))
    }

    /// Replace an existing part's content
    pub fn replace(&mut self, name: &str, content: Vec<u8>) {
        for entry in &mut self.entries {
            if let Entry::File(n, data) = entry {
                if n == name {
                    *data = content;
                    return;
                }
            }
        }
        self.entries.push(Entry::File(name.to_string(), content));
    }

    /// Resolve a sheet name to its XML part path
    pub fn sheet_part(&self, sheet_name: &'static str) -> Result<String> {
        // 1. Get rId from xl/workbook.xml
        let rid = find_sheet_rid(self.part_str(WORKBOOK_PART)?, sheet_name)?
            .ok_or(TemplateError::SheetMissing(sheet_name))?;

        // 2. Resolve rId in xl/_rels/workbook.xml.rels
        let target = find_relationship_target(self.part_str(WORKBOOK_RELS_PART)?, &rid)?
            .ok_or_else(|| {
                TemplateError::Unreadable(format!(
                    "relationship '{}' not found for sheet '{}'",
                    rid, sheet_name
                ))
            })?;

        // Targets are relative to `xl/` unless absolute
        Ok(match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        })
    }

    /// Serialize the package back into a zip container
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            match entry {
                Entry::Directory(name) => zip_writer.add_directory(name.as_str(), options)?,
                Entry::File(name, data) => {
                    zip_writer.start_file(name.as_str(), options)?;
                    zip_writer.write_all(data)?;
                }
            }
        }

        Ok(zip_writer.finish()?.into_inner())
    }
}

fn find_sheet_rid(workbook_xml: &str, sheet_name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(workbook_xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut r_id = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = attr.unescape_value()?.to_string(),
                        b"r:id" => r_id = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }
                if name == sheet_name {
                    return Ok(Some(r_id));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn find_relationship_target(rels_xml: &str, rid: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(rels_xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value()?.to_string(),
                        b"Target" => target = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }
                if id == rid {
                    return Ok(Some(target));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
