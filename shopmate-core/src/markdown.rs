//! Line classification for rendering assistant replies
//!
//! The widget re-renders the full accumulated buffer after every chunk, so
//! this stays a pure function of the text. Classification mirrors what the
//! storefront shows: headings, bullets, code fences and inline code get
//! distinct styling, everything else renders plain.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineKind {
    Heading1,
    Heading2,
    Bullet,
    CodeFence,
    InlineCode,
    Plain,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedLine {
    pub kind: LineKind,
    pub text: String,
}

fn classify(line: &str) -> LineKind {
    if line.starts_with("```") {
        LineKind::CodeFence
    } else if line.starts_with("# ") {
        LineKind::Heading1
    } else if line.starts_with("## ") {
        LineKind::Heading2
    } else if line.starts_with("- ") || line.starts_with("* ") {
        LineKind::Bullet
    } else if line.len() > 1 && line.starts_with('`') && line.ends_with('`') {
        LineKind::InlineCode
    } else {
        LineKind::Plain
    }
}

/// Render accumulated reply text into displayable lines.
pub fn render(text: &str) -> Vec<RenderedLine> {
    text.lines()
        .map(|line| RenderedLine {
            kind: classify(line),
            text: line.to_string(),
        })
        .collect()
}
