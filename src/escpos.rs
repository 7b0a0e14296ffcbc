use serde::{Deserialize, Serialize};

/// ESC/POS Commands (byte sequences)
const ESC: u8 = 0x1b;
const GS: u8 = 0x1d;
const LF: u8 = 0x0a;

/// `GS V 66 0` - feed to cutter position and cut.
pub const CUT: [u8; 4] = [GS, 0x56, 0x42, 0x00];

/// Paper width configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperWidth {
    #[serde(rename = "58mm")]
    Width58mm = 32, // 32 characters per line
    #[default]
    #[serde(rename = "80mm")]
    Width80mm = 48, // 48 characters per line
}

impl PaperWidth {
    pub fn columns(self) -> usize {
        self as usize
    }
}

impl std::str::FromStr for PaperWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "58mm" | "58" => Ok(PaperWidth::Width58mm),
            "80mm" | "80" => Ok(PaperWidth::Width80mm),
            other => Err(format!("unknown paper width {:?}, expected 58mm or 80mm", other)),
        }
    }
}

/// Text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left = 0,
    Center = 1,
    Right = 2,
}

/// Character scale (`GS ! n`), width and height multiplier packed in one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    Normal = 0x00,
    Double = 0x11,
    Triple = 0x22,
}

impl TextSize {
    fn from_byte(n: u8) -> Self {
        match n {
            0x00 => TextSize::Normal,
            n if (n & 0x0f) >= 2 || (n >> 4) >= 2 => TextSize::Triple,
            _ => TextSize::Double,
        }
    }
}

/// ESC/POS Command Builder
pub struct ESCPOSBuilder {
    buffer: Vec<u8>,
    paper_width: PaperWidth,
}

impl ESCPOSBuilder {
    pub fn new(paper_width: PaperWidth) -> Self {
        Self {
            buffer: Vec::new(),
            paper_width,
        }
    }

    /// Get the built command buffer
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }

    pub fn paper_width(&self) -> PaperWidth {
        self.paper_width
    }

    /// Add text
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.buffer.extend_from_slice(text.as_bytes());
        self
    }

    /// Add text followed by a line feed
    pub fn line(&mut self, text: &str) -> &mut Self {
        self.text(text).feed(1)
    }

    /// Add line feed
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        for _ in 0..lines {
            self.buffer.push(LF);
        }
        self
    }

    /// Set text alignment
    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, alignment as u8]);
        self
    }

    /// Set text size
    pub fn size(&mut self, size: TextSize) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x21, size as u8]);
        self
    }

    /// Draw horizontal line across the paper width
    pub fn divider(&mut self, ch: char) -> &mut Self {
        let line: String = ch.to_string().repeat(self.paper_width.columns());
        self.line(&line)
    }

    /// Line break then cut paper
    pub fn cut(&mut self) -> &mut Self {
        self.feed(1);
        self.buffer.extend_from_slice(&CUT);
        self
    }
}

/// True if the stream already finishes with the cut command
pub fn ends_with_cut(bytes: &[u8]) -> bool {
    bytes.ends_with(&CUT)
}

// ============================================================================
// ESC/POS Binary Parser (for print preview)
// ============================================================================

/// A single element in a parsed receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ReceiptElement {
    Line {
        content: String,
        size: TextSize,
        alignment: Alignment,
    },
    Cut,
}

/// Parsed receipt, one element per printed line
#[derive(Debug, Clone, Serialize)]
pub struct ParsedReceipt {
    pub elements: Vec<ReceiptElement>,
    pub char_width: u8,
}

impl ParsedReceipt {
    /// Printed text lines, ignoring style and cuts
    pub fn lines(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                ReceiptElement::Line { content, .. } => Some(content.as_str()),
                ReceiptElement::Cut => None,
            })
            .collect()
    }

    pub fn cut_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, ReceiptElement::Cut))
            .count()
    }

    /// Render as plain text, centering lines the way the printer would
    pub fn to_text(&self) -> String {
        let width = self.char_width as usize;
        let mut out = String::new();
        for element in &self.elements {
            match element {
                ReceiptElement::Line { content, alignment, .. } => {
                    let len = content.chars().count();
                    let pad = match alignment {
                        Alignment::Left => 0,
                        Alignment::Center => width.saturating_sub(len) / 2,
                        Alignment::Right => width.saturating_sub(len),
                    };
                    out.push_str(&" ".repeat(pad));
                    out.push_str(content);
                    out.push('\n');
                }
                ReceiptElement::Cut => {
                    out.push_str(&"- ".repeat(width / 2));
                    out.push_str("8<\n");
                }
            }
        }
        out
    }
}

/// Parse ESC/POS binary buffer into structured receipt data
///
/// Understands the subset emitted by [`ESCPOSBuilder`]: alignment (`ESC a`),
/// character size (`GS !`), cut (`GS V`) and line feeds. Alignment and size
/// persist across lines until changed, as on the printer.
pub fn parse_escpos(buffer: &[u8], paper_width: PaperWidth) -> ParsedReceipt {
    let mut elements = Vec::new();
    let mut size = TextSize::Normal;
    let mut alignment = Alignment::Left;
    let mut text_buf: Vec<u8> = Vec::new();
    let mut i = 0;

    while i < buffer.len() {
        match buffer[i] {
            ESC if i + 2 < buffer.len() && buffer[i + 1] == 0x61 => {
                alignment = match buffer[i + 2] {
                    1 => Alignment::Center,
                    2 => Alignment::Right,
                    _ => Alignment::Left,
                };
                i += 3;
            }
            ESC if i + 1 < buffer.len() && buffer[i + 1] == 0x40 => {
                size = TextSize::Normal;
                alignment = Alignment::Left;
                i += 2;
            }
            GS if i + 2 < buffer.len() && buffer[i + 1] == 0x21 => {
                size = TextSize::from_byte(buffer[i + 2]);
                i += 3;
            }
            GS if i + 2 < buffer.len() && buffer[i + 1] == 0x56 => {
                // Function B carries a feed amount after the mode byte
                let len = if buffer[i + 2] >= 0x41 { 4 } else { 3 };
                elements.push(ReceiptElement::Cut);
                i += len;
            }
            LF => {
                elements.push(ReceiptElement::Line {
                    content: String::from_utf8_lossy(&text_buf).into_owned(),
                    size,
                    alignment,
                });
                text_buf.clear();
                i += 1;
            }
            byte => {
                if byte >= 0x20 {
                    text_buf.push(byte);
                }
                i += 1;
            }
        }
    }

    if !text_buf.is_empty() {
        elements.push(ReceiptElement::Line {
            content: String::from_utf8_lossy(&text_buf).into_owned(),
            size,
            alignment,
        });
    }

    ParsedReceipt {
        elements,
        char_width: paper_width as u8,
    }
}
