//! Edit Module
//!
//! Passes never touch the tree. They record [`EditOperation`]s against spans of
//! the ORIGINAL text into one shared [`Rewrite`], and the rewrite is rendered
//! once at emit time.
//!
//! Rendering rules:
//! - an insert at the start of a removed range is kept and lands before it;
//!   inserts strictly inside a removed range are dropped
//! - [`Rewrite::excise`] also drops the inserts already recorded at its start
//! - a relocated range is cut from its place and re-rendered, inner edits
//!   included, at its destination followed by its suffix
//! - several inserts at one position keep the order they were recorded in

use oxc_span::Span;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOperation {
    Insert {
        at: u32,
        text: String,
    },
    Remove {
        span: Span,
    },
    /// Cut `removed` and emit the rendered `body` (plus `suffix`) at `to`.
    Relocate {
        body: Span,
        removed: Span,
        to: u32,
        suffix: String,
    },
}

/// A piece of rendered output: a copied range of the original or new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Original { start: u32, end: u32 },
    Synthetic(String),
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Default, Clone)]
pub struct Rewrite {
    ops: Vec<EditOperation>,
}

enum Payload<'r> {
    Text(&'r str),
    Moved(usize),
}

struct Cut {
    end: u32,
    relocation: Option<usize>,
}

impl Rewrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.ops.push(EditOperation::Insert {
            at,
            text: text.into(),
        });
    }

    /// Like [`Rewrite::insert`] but lands before every edit already recorded
    /// at `at`.
    pub fn insert_front(&mut self, at: u32, text: impl Into<String>) {
        self.ops.insert(
            0,
            EditOperation::Insert {
                at,
                text: text.into(),
            },
        );
    }

    pub fn remove(&mut self, span: Span) {
        if span.end > span.start {
            self.ops.push(EditOperation::Remove { span });
        }
    }

    /// Removes `span` together with every insert recorded inside it,
    /// including one at its start. For cutting list elements whose own
    /// annotations must go with them.
    pub fn excise(&mut self, span: Span) {
        if span.end <= span.start {
            return;
        }
        self.ops.retain(|op| {
            !matches!(op, EditOperation::Insert { at, .. } if span.start <= *at && *at < span.end)
        });
        self.ops.push(EditOperation::Remove { span });
    }

    pub fn relocate(&mut self, body: Span, removed: Span, to: u32, suffix: &str) {
        self.ops.push(EditOperation::Relocate {
            body,
            removed,
            to,
            suffix: suffix.to_string(),
        });
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = EditOperation>) {
        self.ops.extend(ops);
    }

    pub fn operations(&self) -> &[EditOperation] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when `span` sits inside a range some earlier edit already cut.
    pub fn is_removed(&self, span: Span) -> bool {
        self.ops.iter().any(|op| {
            let cut = match op {
                EditOperation::Remove { span } => *span,
                EditOperation::Relocate { removed, .. } => *removed,
                EditOperation::Insert { .. } => return false,
            };
            cut.start <= span.start && span.end <= cut.end
        })
    }

    pub fn render(&self, source: &str) -> Rendered {
        let mut inserts: BTreeMap<u32, Vec<Payload<'_>>> = BTreeMap::new();
        let mut cuts: BTreeMap<u32, Vec<Cut>> = BTreeMap::new();
        let mut relocations: Vec<(Span, &str)> = Vec::new();

        for op in &self.ops {
            match op {
                EditOperation::Insert { at, text } => {
                    inserts.entry(*at).or_default().push(Payload::Text(text));
                }
                EditOperation::Remove { span } => {
                    cuts.entry(span.start).or_default().push(Cut {
                        end: span.end,
                        relocation: None,
                    });
                }
                EditOperation::Relocate {
                    body,
                    removed,
                    to,
                    suffix,
                } => {
                    let index = relocations.len();
                    relocations.push((*body, suffix));
                    cuts.entry(removed.start).or_default().push(Cut {
                        end: removed.end,
                        relocation: Some(index),
                    });
                    inserts.entry(*to).or_default().push(Payload::Moved(index));
                }
            }
        }

        let renderer = Renderer {
            source,
            inserts,
            cuts,
            relocations,
        };
        let mut chunks = Vec::new();
        let mut active = Vec::new();
        renderer.render_range(0, source.len() as u32, true, &mut active, &mut chunks);

        let chunks = merge_adjacent(chunks);
        let mut text = String::with_capacity(source.len());
        for chunk in &chunks {
            match chunk {
                Chunk::Original { start, end } => {
                    text.push_str(source.get(*start as usize..*end as usize).unwrap_or(""))
                }
                Chunk::Synthetic(s) => text.push_str(s),
            }
        }
        Rendered { text, chunks }
    }
}

struct Renderer<'r> {
    source: &'r str,
    inserts: BTreeMap<u32, Vec<Payload<'r>>>,
    cuts: BTreeMap<u32, Vec<Cut>>,
    relocations: Vec<(Span, &'r str)>,
}

impl<'r> Renderer<'r> {
    fn render_range(
        &self,
        start: u32,
        end: u32,
        include_end: bool,
        active: &mut Vec<usize>,
        out: &mut Vec<Chunk>,
    ) {
        let mut pos = start;
        loop {
            let cut_end = self
                .cuts
                .get(&pos)
                .into_iter()
                .flatten()
                .filter(|c| c.end > pos && c.relocation.map_or(true, |r| !active.contains(&r)))
                .map(|c| (c.end, c.relocation))
                .max_by_key(|(end, _)| *end);

            // Inserts at the start of a moved body travel with the body.
            let owned_by_move = matches!(cut_end, Some((_, Some(r))) if self.relocations[r].0.start == pos);
            if (pos < end || include_end) && !owned_by_move {
                self.emit_inserts(pos, active, out);
            }
            if pos >= end {
                break;
            }

            if let Some((cut_end, _)) = cut_end {
                pos = cut_end.min(end);
                if pos >= end && !include_end {
                    break;
                }
                continue;
            }

            let next_insert = self.inserts.range(pos + 1..).next().map(|(at, _)| *at);
            let next_cut = self.cuts.range(pos + 1..).next().map(|(at, _)| *at);
            let next = [next_insert, next_cut, Some(end)]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(end)
                .min(end);
            out.push(Chunk::Original {
                start: pos,
                end: next,
            });
            pos = next;
        }
    }

    fn emit_inserts(&self, pos: u32, active: &mut Vec<usize>, out: &mut Vec<Chunk>) {
        let Some(payloads) = self.inserts.get(&pos) else {
            return;
        };
        for payload in payloads {
            match payload {
                Payload::Text(text) => out.push(Chunk::Synthetic((*text).to_string())),
                Payload::Moved(index) => {
                    let (body, suffix) = self.relocations[*index];
                    // A destination inside its own body would recurse forever.
                    if active.contains(index) || (body.start <= pos && pos < body.end) {
                        continue;
                    }
                    active.push(*index);
                    self.render_range(body.start, body.end, false, active, out);
                    active.pop();
                    out.push(Chunk::Synthetic(suffix.to_string()));
                }
            }
        }
    }
}

/// Widens a statement span so removing it leaves no stray blanks: leading
/// spaces on its line go with it, and a statement alone on its line takes
/// its line break too.
pub fn statement_cut(source: &str, span: Span) -> Span {
    let bytes = source.as_bytes();
    let mut start = span.start as usize;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let mut end = (span.end as usize).min(bytes.len());
    let line_start = start == 0 || bytes[start - 1] == b'\n';
    if line_start {
        let mut probe = end;
        while probe < bytes.len() && matches!(bytes[probe], b' ' | b'\t') {
            probe += 1;
        }
        if bytes.get(probe) == Some(&b'\r') && bytes.get(probe + 1) == Some(&b'\n') {
            end = probe + 2;
        } else if bytes.get(probe) == Some(&b'\n') {
            end = probe + 1;
        }
    }
    Span::new(start as u32, end as u32)
}

fn merge_adjacent(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match (merged.last_mut(), chunk) {
            (Some(Chunk::Original { end, .. }), Chunk::Original { start, end: next_end })
                if *end == start =>
            {
                *end = next_end;
            }
            (Some(Chunk::Synthetic(prev)), Chunk::Synthetic(text)) => prev.push_str(&text),
            (_, chunk) => {
                if !matches!(&chunk, Chunk::Synthetic(s) if s.is_empty())
                    && !matches!(&chunk, Chunk::Original { start, end } if start == end)
                {
                    merged.push(chunk);
                }
            }
        }
    }
    merged
}
