//! Minimal PDF report writer for transcript exports.
//!
//! Emits a self-contained PDF 1.4 document with Helvetica text in
//! WinAnsi encoding. Characters outside Latin-1 cannot be represented by
//! the base fonts and are replaced with `?`, the same constraint the
//! export has always had. No external PDF library is involved; the report
//! is three text sections with word wrapping and page breaks.

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 50.0;

const TITLE_SIZE: f32 = 16.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 12.0;

// Helvetica's average glyph width, good enough for wrapping plain prose.
const AVG_GLYPH_WIDTH: f32 = 0.5;

struct Line {
    x: f32,
    size: f32,
    bold: bool,
    text: String,
}

/// Renders the report PDF for one processed upload.
pub fn render_report(title: &str, summary: &str, transcript: &str) -> Vec<u8> {
    let mut lines: Vec<Line> = Vec::new();

    for piece in wrap_text(&format!("TranscribeFlow Report: {title}"), TITLE_SIZE) {
        let width = piece.chars().count() as f32 * AVG_GLYPH_WIDTH * TITLE_SIZE;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        lines.push(Line {
            x,
            size: TITLE_SIZE,
            bold: true,
            text: piece,
        });
    }
    lines.push(blank_line());

    push_section(&mut lines, "Summary", summary);
    lines.push(blank_line());
    push_section(&mut lines, "Transcript", transcript);

    assemble_document(&paginate(&lines))
}

fn blank_line() -> Line {
    Line {
        x: MARGIN,
        size: BODY_SIZE,
        bold: false,
        text: String::new(),
    }
}

fn push_section(lines: &mut Vec<Line>, heading: &str, body: &str) {
    lines.push(Line {
        x: MARGIN,
        size: HEADING_SIZE,
        bold: true,
        text: heading.to_string(),
    });
    for piece in wrap_text(body, BODY_SIZE) {
        lines.push(Line {
            x: MARGIN,
            size: BODY_SIZE,
            bold: false,
            text: piece,
        });
    }
}

/// Greedy word wrap against an average-width character budget.
fn wrap_text(text: &str, size: f32) -> Vec<String> {
    let max_chars = (((PAGE_WIDTH - 2.0 * MARGIN) / (AVG_GLYPH_WIDTH * size)) as usize).max(8);
    let mut out = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            // Hard-split words that alone exceed a line.
            let mut word = word;
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                let cut = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(idx, _)| idx)
                    .unwrap_or(word.len());
                out.push(word[..cut].to_string());
                word = &word[cut..];
            }

            let needed = current.chars().count() + usize::from(!current.is_empty())
                + word.chars().count();
            if !current.is_empty() && needed > max_chars {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }

    out
}

/// Lays lines out onto pages, returning one content stream per page.
fn paginate(lines: &[Line]) -> Vec<Vec<u8>> {
    let mut pages: Vec<Vec<u8>> = Vec::new();
    let mut content: Vec<u8> = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let leading = line.size * 1.4;
        if y - leading < MARGIN {
            pages.push(std::mem::take(&mut content));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= leading;

        if line.text.is_empty() {
            continue;
        }

        let font = if line.bold { "F2" } else { "F1" };
        content.extend_from_slice(
            format!("BT /{font} {:.1} Tf {:.2} {y:.2} Td (", line.size, line.x).as_bytes(),
        );
        content.extend_from_slice(&encode_winansi(&line.text));
        content.extend_from_slice(b") Tj ET\n");
    }

    pages.push(content);
    pages
}

/// Folds text to WinAnsi bytes, escaping PDF string delimiters.
/// Characters outside Latin-1 become `?`.
fn encode_winansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = if (c as u32) < 0x100 { c as u32 as u8 } else { b'?' };
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' | b'\r' | b'\t' => out.push(b' '),
            _ => out.push(byte),
        }
    }
    out
}

/// Serializes catalog, page tree, fonts, pages, and content streams into a
/// complete PDF file with a valid xref table.
fn assemble_document(pages: &[Vec<u8>]) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        {
            let kids = (0..page_count)
                .map(|i| format!("{} 0 R", 5 + 2 * i))
                .collect::<Vec<_>>()
                .join(" ");
            format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>").into_bytes()
        },
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    ];

    for (i, content) in pages.iter().enumerate() {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                6 + 2 * i
            )
            .into_bytes(),
        );

        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content);
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (idx, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", idx + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_pos}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );

    out
}
