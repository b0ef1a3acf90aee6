//! Placeholder substitution inside Word (.docx) packages.
//!
//! Placeholders are written as `{nama}` in the template text. Word frequently
//! splits one visible word across several `<w:r>` runs, so tokens are located
//! in the concatenated text of each paragraph and the replacement is written
//! into the run where the token starts.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use lazy_static::lazy_static;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::fields::DataMap;
use super::LetterError;

const DOCUMENT_PART: &str = "word/document.xml";
const LINE_BREAK: &str = r#"</w:t><w:br/><w:t xml:space="preserve">"#;

lazy_static! {
    static ref TEXT_RUN: Regex =
        Regex::new(r"(<w:t(?:\s[^>]*)?>)([^<]*)</w:t>").expect("valid text run regex");
    static ref TOKEN_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid token regex");
    static ref TEXT_PART: Regex = Regex::new(
        r"^word/(document|header[0-9]*|footer[0-9]*|footnotes|endnotes)\.xml$"
    )
    .expect("valid part regex");
}

/// Merges a template package with a token map.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxRenderer;

impl DocxRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Renders `template` (the bytes of a .docx file) with `data`.
    ///
    /// Fails with `LetterError::TemplateRender` when the package is unreadable
    /// or when any placeholder has no value in `data`; all missing names are
    /// reported together.
    pub fn render(&self, template: &[u8], data: &DataMap) -> Result<Vec<u8>, LetterError> {
        let data = data.clone().with_composites();

        let mut archive = ZipArchive::new(Cursor::new(template))
            .map_err(|e| LetterError::corrupt_template(format!("not a Word package: {}", e)))?;
        if archive.index_for_name(DOCUMENT_PART).is_none() {
            return Err(LetterError::corrupt_template(format!(
                "package has no {}",
                DOCUMENT_PART
            )));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(template.len())));
        let mut missing = BTreeSet::new();

        for index in 0..archive.len() {
            let name = archive
                .by_index_raw(index)
                .map_err(zip_error)?
                .name()
                .to_string();

            if !TEXT_PART.is_match(&name) {
                let raw = archive.by_index_raw(index).map_err(zip_error)?;
                writer.raw_copy_file(raw).map_err(zip_error)?;
                continue;
            }

            let mut part = archive.by_index(index).map_err(zip_error)?;
            let options = SimpleFileOptions::default()
                .compression_method(part.compression())
                .last_modified_time(part.last_modified().unwrap_or_default());
            let mut xml = String::new();
            part.read_to_string(&mut xml).map_err(|e| {
                LetterError::corrupt_template(format!("cannot read {}: {}", name, e))
            })?;
            drop(part);

            let filled = fill_part(&xml, &data, &mut missing)
                .map_err(|msg| LetterError::corrupt_template(format!("{} in {}", msg, name)))?;

            writer.start_file(name, options).map_err(zip_error)?;
            writer.write_all(filled.as_bytes()).map_err(|e| {
                LetterError::corrupt_template(format!("failed to write package: {}", e))
            })?;
        }

        if !missing.is_empty() {
            return Err(LetterError::missing_tokens(missing.into_iter().collect()));
        }

        let cursor = writer.finish().map_err(zip_error)?;
        Ok(cursor.into_inner())
    }
}

fn zip_error(err: zip::result::ZipError) -> LetterError {
    LetterError::corrupt_template(format!("corrupt Word package: {}", err))
}

/// One `<w:t>` element found in a part.
struct TextNode {
    start: usize,
    end: usize,
    open_tag: String,
    text: String,
    paragraph: usize,
}

/// Substitutes the tokens of one XML part. Unknown token names are added to
/// `missing`; malformed tags are returned as an error message.
fn fill_part(
    xml: &str,
    data: &DataMap,
    missing: &mut BTreeSet<String>,
) -> Result<String, String> {
    let paragraph_ends: Vec<usize> = xml.match_indices("</w:p>").map(|(i, _)| i).collect();

    let nodes: Vec<TextNode> = TEXT_RUN
        .captures_iter(xml)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TextNode {
                start: whole.start(),
                end: whole.end(),
                open_tag: caps.get(1)?.as_str().to_string(),
                text: unescape_xml(caps.get(2)?.as_str()),
                paragraph: paragraph_ends.partition_point(|&p| p < whole.start()),
            })
        })
        .collect();

    let mut replaced: Vec<Option<String>> = vec![None; nodes.len()];
    let mut group_start = 0;
    while group_start < nodes.len() {
        let paragraph = nodes[group_start].paragraph;
        let mut group_end = group_start;
        while group_end < nodes.len() && nodes[group_end].paragraph == paragraph {
            group_end += 1;
        }
        if let Some(outputs) = fill_paragraph(&nodes[group_start..group_end], data, missing)? {
            for (offset, output) in outputs.into_iter().enumerate() {
                replaced[group_start + offset] = Some(output);
            }
        }
        group_start = group_end;
    }

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (node, output) in nodes.iter().zip(replaced) {
        let Some(output) = output else { continue };
        out.push_str(&xml[cursor..node.start]);
        if node.open_tag.contains("xml:space") {
            out.push_str(&node.open_tag);
        } else {
            out.push_str(r#"<w:t xml:space="preserve">"#);
        }
        out.push_str(&escape_with_breaks(&output));
        out.push_str("</w:t>");
        cursor = node.end;
    }
    out.push_str(&xml[cursor..]);
    Ok(out)
}

/// Returns the new text of every node in the paragraph, or `None` when the
/// paragraph holds no tokens and must stay byte-identical.
fn fill_paragraph(
    nodes: &[TextNode],
    data: &DataMap,
    missing: &mut BTreeSet<String>,
) -> Result<Option<Vec<String>>, String> {
    let chars: Vec<(char, usize)> = nodes
        .iter()
        .enumerate()
        .flat_map(|(idx, node)| node.text.chars().map(move |c| (c, idx)))
        .collect();

    if !chars.iter().any(|(c, _)| *c == '{') {
        return Ok(None);
    }

    let mut outputs = vec![String::new(); nodes.len()];
    let mut i = 0;
    while i < chars.len() {
        let (ch, owner) = chars[i];
        if ch != '{' {
            outputs[owner].push(ch);
            i += 1;
            continue;
        }

        let close = chars[i + 1..]
            .iter()
            .position(|(c, _)| *c == '}')
            .map(|p| i + 1 + p)
            .ok_or_else(|| {
                let snippet: String = chars[i..].iter().take(30).map(|(c, _)| *c).collect();
                format!("unclosed placeholder near \"{}\"", snippet)
            })?;

        let raw: String = chars[i + 1..close].iter().map(|(c, _)| *c).collect();
        let name = raw.trim();
        if !TOKEN_NAME.is_match(name) {
            return Err(format!("invalid placeholder \"{{{}}}\"", raw));
        }

        match data.get(name) {
            Some(value) => outputs[owner].push_str(value),
            None => {
                missing.insert(name.to_string());
            }
        }
        i = close + 1;
    }

    Ok(Some(outputs))
}

fn escape_with_breaks(text: &str) -> String {
    text.split('\n')
        .map(escape_xml)
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> DataMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn paragraph(runs: &[&str]) -> String {
        let runs: String = runs
            .iter()
            .map(|t| format!("<w:r><w:t>{}</w:t></w:r>", t))
            .collect();
        format!("<w:p>{}</w:p>", runs)
    }

    #[test]
    fn test_fill_simple_tokens() {
        let xml = paragraph(&["Nama: {nama}, NIK: {nik}"]);
        let mut missing = BTreeSet::new();
        let out = fill_part(
            &xml,
            &data(&[("nama", "BUDI"), ("nik", "1234567890123456")]),
            &mut missing,
        )
        .unwrap();
        assert!(missing.is_empty());
        assert!(out.contains("Nama: BUDI, NIK: 1234567890123456"));
        assert!(!out.contains('{'));
    }

    #[test]
    fn test_token_split_across_runs() {
        let xml = paragraph(&["Nama: {na", "ma", "} selesai"]);
        let mut missing = BTreeSet::new();
        let out = fill_part(&xml, &data(&[("nama", "BUDI")]), &mut missing).unwrap();
        assert!(out.contains(r#"<w:t xml:space="preserve">Nama: BUDI</w:t>"#));
        assert!(out.contains(r#"<w:t xml:space="preserve"></w:t>"#));
        assert!(out.contains(r#"<w:t xml:space="preserve"> selesai</w:t>"#));
    }

    #[test]
    fn test_tokens_do_not_join_across_paragraphs() {
        let xml = format!("{}{}", paragraph(&["{nama"]), paragraph(&["}"]));
        let mut missing = BTreeSet::new();
        let err = fill_part(&xml, &data(&[("nama", "BUDI")]), &mut missing).unwrap_err();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_untouched_paragraphs_stay_identical() {
        let plain = r#"<w:p><w:r><w:t xml:space="preserve">Kepada Yth. &amp; </w:t></w:r></w:p>"#;
        let xml = format!("{}{}", plain, paragraph(&["{nama}"]));
        let mut missing = BTreeSet::new();
        let out = fill_part(&xml, &data(&[("nama", "BUDI")]), &mut missing).unwrap();
        assert!(out.starts_with(plain));
    }

    #[test]
    fn test_missing_tokens_are_collected() {
        let xml = paragraph(&["{nama} {alamat} {umur}"]);
        let mut missing = BTreeSet::new();
        fill_part(&xml, &data(&[("nama", "BUDI")]), &mut missing).unwrap();
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec!["alamat".to_string(), "umur".to_string()]
        );
    }

    #[test]
    fn test_values_are_escaped_and_break_lines() {
        let xml = paragraph(&["{catatan}"]);
        let mut missing = BTreeSet::new();
        let out = fill_part(&xml, &data(&[("catatan", "A & B\n<C>")]), &mut missing).unwrap();
        assert!(out.contains("A &amp; B</w:t><w:br/><w:t xml:space=\"preserve\">&lt;C&gt;"));
    }

    #[test]
    fn test_invalid_placeholder_rejected() {
        let xml = paragraph(&["{nama lengkap}"]);
        let mut missing = BTreeSet::new();
        assert!(fill_part(&xml, &data(&[]), &mut missing).is_err());
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape_xml("a &amp; b &#65;&#x42; &unknown;"), "a & b AB &unknown;");
        assert_eq!(unescape_xml("no entities"), "no entities");
    }

    #[test]
    fn test_tab_elements_are_not_text_runs() {
        let xml = "<w:p><w:r><w:tab/><w:t>{nama}</w:t></w:r></w:p>";
        let mut missing = BTreeSet::new();
        let out = fill_part(xml, &data(&[("nama", "BUDI")]), &mut missing).unwrap();
        assert!(out.contains("<w:tab/>"));
        assert!(out.contains(">BUDI</w:t>"));
    }

    fn package(lines: &[&str]) -> Vec<u8> {
        let mut docx = docx_rs::Docx::new();
        for line in lines {
            docx = docx.add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*line)),
            );
        }
        let mut buf = Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();
        buf.into_inner()
    }

    fn entries(docx: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).unwrap();
                (file.name().to_string(), bytes)
            })
            .collect()
    }

    #[test]
    fn test_render_is_deterministic_and_only_touches_tokens() {
        let template = package(&[
            "SURAT KETERANGAN DOMISILI",
            "Nama: {nama}",
            "NIK: {nik}",
            "Demikian surat ini dibuat.",
        ]);
        let values = data(&[("nama", "BUDI"), ("nik", "1234567890123456")]);
        let renderer = DocxRenderer::new();

        let first = renderer.render(&template, &values).unwrap();
        let second = renderer.render(&template, &values).unwrap();
        assert_eq!(first, second);

        let before = entries(&template);
        let after = entries(&first);
        assert_eq!(
            before.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            after.iter().map(|(n, _)| n).collect::<Vec<_>>()
        );
        for ((name, original), (_, rendered)) in before.iter().zip(&after) {
            if name == DOCUMENT_PART {
                let expected = String::from_utf8(original.clone())
                    .unwrap()
                    .replace("{nama}", "BUDI")
                    .replace("{nik}", "1234567890123456");
                assert_eq!(String::from_utf8(rendered.clone()).unwrap(), expected);
            } else {
                assert_eq!(original, rendered, "{} changed", name);
            }
        }
    }

    #[test]
    fn test_render_rejects_non_zip_input() {
        let err = DocxRenderer::new()
            .render(b"definitely not a zip", &DataMap::new())
            .unwrap_err();
        assert!(matches!(err, LetterError::TemplateRender { .. }));
    }
}
