//! Paragraph rewriter: replaces bracketed codes in a `w:p` with hyperlinks.
//!
//! Rewriting is split in two. [`plan_segments`] is pure and works on the
//! flattened paragraph text; the commit step swaps the paragraph's direct text
//! runs for freshly built runs and hyperlinks, putting each piece of text back
//! between the same kept content (hyperlinks, drawings, bookmarks) it sat
//! between before.

use std::ops::Range;

use crate::scanner;
use crate::types::{CodeMapping, Counts, RunStyle, Segment};
use crate::xml::{Element, Node};

/// Hyperlink text color.
const LINK_COLOR: &str = "0000FF";

/// Text stand-in for `w:noBreakHyphen`.
const NO_BREAK_HYPHEN: char = '\u{2011}';

/// Run element.
const RUN: &str = "w:r";

/// Run properties element.
const RUN_PROPERTIES: &str = "w:rPr";

/// Source of relationship ids for hyperlink targets.
pub trait HyperlinkRegistry {
    /// Relationship id of an external hyperlink to `url`, created if needed.
    fn hyperlink_id(&mut self, url: &str) -> String;
}

/// What happened to one matched token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Code without brackets.
    pub code: String,
    /// Whether the token became a hyperlink.
    pub linked: bool,
}

/// Planned content of a paragraph that contains at least one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Tokens found and linked.
    pub counts: Counts,
    /// One entry per token, left to right.
    pub outcomes: Vec<Outcome>,
    /// Replacement content. Display texts concatenate to the original text.
    pub segments: Vec<Segment>,
}

/// Text of the paragraph's direct runs, in order.
///
/// `w:t` contributes its text, `w:tab` a tab, `w:br` a newline, `w:cr` a
/// carriage return and `w:noBreakHyphen` U+2011, so each reads back as the
/// element it came from.
/// Hyperlinks, fields and other non-run children are not included.
pub fn paragraph_text(paragraph: &Element) -> String {
    let mut text = String::new();
    for run in paragraph.elements().filter(|e| return e.name == RUN) {
        for piece in run.elements() {
            if let Some(piece_text) = text_of_piece(piece) {
                text.push_str(piece_text);
            }
        }
    }
    return text;
}

/// Split `text` into plain and hyperlink segments.
///
/// Returns `None` when the text is empty or holds no token, in which case the
/// paragraph must be left untouched.
pub fn plan_segments(text: &str, mapping: &CodeMapping) -> Option<Plan> {
    let tokens = scanner::find_tokens(text);
    if tokens.is_empty() {
        return None;
    }

    let mut plan = Plan::default();
    let mut cursor = 0;
    for token in tokens {
        if let Some(gap) = text.get(cursor..token.start).filter(|gap| return !gap.is_empty()) {
            plan.segments.push(Segment::Plain(gap.to_string()));
        }

        plan.counts.found = plan.counts.found.saturating_add(1);
        let entry = mapping.get(&token.code).filter(|entry| return !entry.url.is_empty());
        let linked = entry.is_some();
        match entry {
            Some(entry) => {
                plan.counts.linked = plan.counts.linked.saturating_add(1);
                plan.segments.push(Segment::Hyperlink {
                    display: token.raw,
                    tooltip: entry.tooltip.clone(),
                    url: entry.url.clone(),
                });
            },
            None => plan.segments.push(Segment::Plain(token.raw)),
        }
        plan.outcomes.push(Outcome { code: token.code, linked });
        cursor = token.end;
    }
    if let Some(rest) = text.get(cursor..).filter(|rest| return !rest.is_empty()) {
        plan.segments.push(Segment::Plain(rest.to_string()));
    }
    debug_assert_eq!(plan.segments.iter().map(Segment::display_text).collect::<String>(), text);

    return Some(plan);
}

/// Rewrite one paragraph in place.
///
/// Returns `None`, leaving the paragraph untouched, when it contains no
/// token. Otherwise the direct text runs are replaced by the planned segments.
/// Runs that also hold non-text content (drawings, fields, page breaks) keep
/// that content, and the visible text order does not change.
pub fn rewrite_paragraph(
    paragraph: &mut Element,
    mapping: &CodeMapping,
    links: &mut dyn HyperlinkRegistry,
) -> Option<Plan> {
    let text = paragraph_text(paragraph);
    let plan = plan_segments(&text, mapping)?;
    let style = run_style(paragraph);
    replace_runs(paragraph, &plan.segments, &style, links);
    return Some(plan);
}

/// Font name and size of the first direct run.
pub fn run_style(paragraph: &Element) -> RunStyle {
    let properties = paragraph
        .elements()
        .find(|e| return e.name == RUN)
        .and_then(|run| return run.child(RUN_PROPERTIES));
    let Some(properties) = properties else {
        return RunStyle::default();
    };
    return RunStyle {
        font_name: properties.child("w:rFonts").and_then(|f| return f.attr("w:ascii")).map(str::to_string),
        font_size: properties.child("w:sz").and_then(|s| return s.attr("w:val")).map(str::to_string),
    };
}

/// `<w:hyperlink r:id w:tooltip>` around one blue, underlined run.
fn hyperlink_element(display: &str, tooltip: Option<&str>, url: &str, links: &mut dyn HyperlinkRegistry) -> Element {
    let id = links.hyperlink_id(url);
    let mut hyperlink = Element::new("w:hyperlink").with_attr("r:id", &id);
    if let Some(tip) = tooltip {
        hyperlink.set_attr("w:tooltip", tip);
    }

    let properties = Element::new(RUN_PROPERTIES)
        .with_child(Element::new("w:color").with_attr("w:val", LINK_COLOR))
        .with_child(Element::new("w:u").with_attr("w:val", "single"));
    let mut run = Element::new(RUN).with_child(properties);
    push_text_pieces(&mut run, display);

    return hyperlink.with_child(run);
}

/// A line break that reads as a newline. Page and column breaks do not.
fn is_line_break(br: &Element) -> bool {
    return br.attr("w:type").is_none_or(|kind| return kind == "textWrapping");
}

/// Plain run carrying the sampled font name and size.
fn plain_run(text: &str, style: &RunStyle) -> Element {
    let mut run = Element::new(RUN);
    if !style.is_empty() {
        let mut properties = Element::new(RUN_PROPERTIES);
        if let Some(name) = &style.font_name {
            properties.push(Element::new("w:rFonts").with_attr("w:ascii", name).with_attr("w:hAnsi", name));
        }
        if let Some(size) = &style.font_size {
            properties.push(Element::new("w:sz").with_attr("w:val", size));
        }
        run.push(properties);
    }
    push_text_pieces(&mut run, text);
    return run;
}

/// Append `text` to a run as `w:t` children and the special characters' elements.
fn push_text_pieces(run: &mut Element, text: &str) {
    let mut pending = String::new();
    for ch in text.chars() {
        let special = match ch {
            '\t' => "w:tab",
            '\n' => "w:br",
            '\r' => "w:cr",
            NO_BREAK_HYPHEN => "w:noBreakHyphen",
            _ => {
                pending.push(ch);
                continue;
            },
        };
        if !pending.is_empty() {
            run.push(text_element(&pending));
            pending.clear();
        }
        run.push(Element::new(special));
    }
    if !pending.is_empty() {
        run.push(text_element(&pending));
    }
    return;
}

/// Rebuild the paragraph's direct run text from the segments.
///
/// Each text range gets back the segment text that came from it, so kept
/// content stays at the same point in the text. A hyperlink goes whole into
/// the range where its token starts.
fn replace_runs(paragraph: &mut Element, segments: &[Segment], style: &RunStyle, links: &mut dyn HyperlinkRegistry) {
    let mut placed = Vec::with_capacity(segments.len());
    let mut cursor = 0_usize;
    for segment in segments {
        let end = cursor.saturating_add(segment.display_text().len());
        placed.push((cursor..end, segment));
        cursor = end;
    }

    for slot in layout(paragraph) {
        let span = match slot {
            Slot::Keep(node) => {
                paragraph.children.push(node);
                continue;
            },
            Slot::Text(span) => span,
        };
        for (range, segment) in &placed {
            let element = match segment {
                Segment::Hyperlink { display, tooltip, url } if span.contains(&range.start) => {
                    hyperlink_element(display, tooltip.as_deref(), url, links)
                },
                Segment::Hyperlink { .. } => continue,
                Segment::Plain(text) => {
                    let from = range.start.max(span.start).saturating_sub(range.start);
                    let to = range.end.min(span.end).saturating_sub(range.start);
                    match text.get(from..to).filter(|piece| return !piece.is_empty()) {
                        Some(piece) => plain_run(piece, style),
                        None => continue,
                    }
                },
            };
            paragraph.children.push(Node::Element(element));
        }
    }
    return;
}

/// One stretch of a paragraph being rebuilt.
enum Slot {
    /// Content that stays as it is: non-run children and the non-text parts
    /// of runs, with the run's properties.
    Keep(Node),
    /// Byte range of [`paragraph_text`] that sat here.
    Text(Range<usize>),
}

/// Take the paragraph's children apart into kept content and text ranges.
fn layout(paragraph: &mut Element) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut start = 0_usize;
    let mut offset = 0_usize;
    for node in std::mem::take(&mut paragraph.children) {
        let run = match node {
            Node::Element(run) if run.name == RUN => run,
            other @ (Node::Element(_) | Node::Other(_) | Node::Text(_)) => {
                close_text(&mut slots, &mut start, offset);
                slots.push(Slot::Keep(other));
                continue;
            },
        };

        let Element { attrs, children, name } = run;
        let (properties, pieces): (Vec<Node>, Vec<Node>) = children
            .into_iter()
            .partition(|child| return matches!(child, Node::Element(e) if e.name == RUN_PROPERTIES));
        let mut kept: Option<Element> = None;
        for piece in pieces {
            let text_len = match &piece {
                Node::Element(element) => text_of_piece(element).map(str::len),
                Node::Other(_) => None,
                // Whitespace between run children carries no text.
                Node::Text(_) => continue,
            };
            if let Some(len) = text_len {
                if let Some(done) = kept.take() {
                    slots.push(Slot::Keep(Node::Element(done)));
                }
                offset = offset.saturating_add(len);
                continue;
            }
            if kept.is_none() {
                close_text(&mut slots, &mut start, offset);
            }
            kept.get_or_insert_with(|| {
                return Element { attrs: attrs.clone(), children: properties.clone(), name: name.clone() };
            })
            .children
            .push(piece);
        }
        if let Some(done) = kept {
            slots.push(Slot::Keep(Node::Element(done)));
        }
    }
    close_text(&mut slots, &mut start, offset);
    return slots;
}

/// End the open text range at `offset`, if it holds anything.
fn close_text(slots: &mut Vec<Slot>, start: &mut usize, offset: usize) {
    if *start < offset {
        slots.push(Slot::Text(*start..offset));
    }
    *start = offset;
    return;
}

/// `w:t`, with `xml:space="preserve"` when edge whitespace must survive.
fn text_element(text: &str) -> Element {
    let mut element = Element::new("w:t");
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        element.set_attr("xml:space", "preserve");
    }
    return element.with_text(text);
}

/// Text a run child contributes, or `None` for non-text content.
fn text_of_piece(piece: &Element) -> Option<&str> {
    return match piece.name.as_str() {
        "w:t" => Some(piece.children.first().map_or("", |node| {
            return match node {
                Node::Text(text) => text.as_str(),
                Node::Element(_) | Node::Other(_) => "",
            };
        })),
        "w:tab" => Some("\t"),
        "w:br" if is_line_break(piece) => Some("\n"),
        "w:cr" => Some("\r"),
        "w:noBreakHyphen" => Some("\u{2011}"),
        _ => None,
    };
}
