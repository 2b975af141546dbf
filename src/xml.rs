//! Rows to an XML report document, shaped for spreadsheet import.

use crate::case::Row;
use crate::error::XmlError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use std::borrow::Cow;
use std::io::Cursor;

const ROOT: &str = "report";
const ROW: &str = "row";

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), XmlError> {
    writer.write_event(event).map_err(|e| XmlError(e.to_string()))
}

/// Field name as an element name. Characters not allowed in an XML name become `_`
/// (`?column?` -> `_column_`), and a name that cannot start an element gets a `_` prefix.
fn element_name(key: &str) -> Cow<'_, str> {
    let is_start = |c: char| c == '_' || c.is_alphabetic();
    let is_name = |c: char| is_start(c) || c.is_numeric() || c == '-' || c == '.';

    let valid = key.chars().next().map(is_start).unwrap_or(false) && key.chars().all(is_name);
    if valid {
        return Cow::Borrowed(key);
    }
    let mut name: String = key.chars().map(|c| if is_name(c) { c } else { '_' }).collect();
    if !name.chars().next().map(is_start).unwrap_or(false) {
        name.insert(0, '_');
    }
    Cow::Owned(name)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// `<report>` with one `<row>` per row and one child per field, then a trailing empty `<row/>`.
///
/// Spreadsheet importers only render a header line when `<row>` repeats, so the
/// empty row is always appended, even for zero or one result rows.
pub fn to_xml(rows: &[Row]) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    write(&mut writer, Event::Start(BytesStart::new(ROOT)))?;

    for row in rows {
        write(&mut writer, Event::Start(BytesStart::new(ROW)))?;
        for (key, value) in row {
            let name = element_name(key);
            match text_of(value) {
                Some(text) => {
                    write(&mut writer, Event::Start(BytesStart::new(&*name)))?;
                    write(&mut writer, Event::Text(BytesText::new(&text)))?;
                    write(&mut writer, Event::End(BytesEnd::new(&*name)))?;
                }
                None => write(&mut writer, Event::Empty(BytesStart::new(&*name)))?,
            }
        }
        write(&mut writer, Event::End(BytesEnd::new(ROW)))?;
    }
    write(&mut writer, Event::Empty(BytesStart::new(ROW)))?;

    write(&mut writer, Event::End(BytesEnd::new(ROOT)))?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| XmlError(e.to_string()))
}
