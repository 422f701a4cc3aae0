//! Cell style registration in `xl/styles.xml`

use anyhow::{Result, anyhow};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

/// Built-in number format id for `@` (text)
const TEXT_NUM_FMT_ID: &str = "49";

fn count_cell_xfs(xml: &str) -> Result<Option<u32>> {
    let mut reader = Reader::from_str(xml);
    let mut in_cell_xfs = false;
    let mut depth = 0;
    let mut count = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => return Ok(Some(count)),
            Event::Start(e) if in_cell_xfs => {
                if depth == 0 && e.local_name().as_ref() == b"xf" {
                    count += 1;
                }
                depth += 1;
            }
            Event::End(_) if in_cell_xfs => depth -= 1,
            Event::Empty(e) if in_cell_xfs && depth == 0 && e.local_name().as_ref() == b"xf" => {
                count += 1
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Append an xf using the text number format to `cellXfs`.
///
/// Returns the rewritten XML and the index of the new style, or `None` when
/// the stylesheet has no populated `cellXfs` to extend.
pub fn add_text_style(xml: &str) -> Result<Option<(Vec<u8>, u32)>> {
    let Some(index) = count_cell_xfs(xml)? else {
        return Ok(None);
    };

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut prefix = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| anyhow!("Error parsing styles XML: {}", e))?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                if let Some(p) = e.name().prefix() {
                    prefix = format!("{}:", String::from_utf8_lossy(p.as_ref()));
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut start = BytesStart::new(name);
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() != b"count" {
                        start.push_attribute(attr);
                    }
                }
                start.push_attribute(("count", (index + 1).to_string().as_str()));
                writer.write_event(Event::Start(start))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => {
                let xf_name = format!("{}xf", prefix);
                let mut xf = BytesStart::new(xf_name.as_str());
                xf.push_attribute(("numFmtId", TEXT_NUM_FMT_ID));
                xf.push_attribute(("fontId", "0"));
                xf.push_attribute(("fillId", "0"));
                xf.push_attribute(("borderId", "0"));
                xf.push_attribute(("xfId", "0"));
                xf.push_attribute(("applyNumberFormat", "1"));
                writer.write_event(Event::Empty(xf))?;
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    Ok(Some((writer.into_inner(), index)))
}
