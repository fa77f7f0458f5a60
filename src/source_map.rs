use serde::{Deserialize, Deserializer, Serialize};

use crate::edits::Chunk;
use crate::validate::{OptimizerError, ERR_SOURCE_MAP};

const BASE64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Source Map v3 JSON document.
/// https://sourcemaps.info/spec.html
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, OptimizerError> {
        serde_json::from_str(json)
            .map_err(|e| OptimizerError::new(ERR_SOURCE_MAP, &e.to_string(), "", 0, 0))
    }

    pub fn segments(&self) -> Result<Vec<Segment>, OptimizerError> {
        decode_mappings(&self.mappings)
    }

    /// Finds the original position for a generated one, offsetting the column
    /// inside the closest preceding segment on the same line.
    pub fn lookup(&self, line: u32, column: u32) -> Result<Option<Origin>, OptimizerError> {
        let segments = self.segments()?;
        Ok(lookup_in(&segments, line, column))
    }
}

/// One decoded mapping. `origin` is `None` for a generated-only segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_line: u32,
    pub generated_column: u32,
    pub origin: Option<Origin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: String,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    segments: Vec<Segment>,
}

impl SourceMapBuilder {
    pub fn new(file: &str, source: &str) -> Self {
        Self {
            file: file.to_string(),
            sources: vec![source.to_string()],
            ..Default::default()
        }
    }

    pub fn set_source_content(&mut self, content: &str) {
        self.sources_content = vec![Some(content.to_string())];
    }

    pub fn add_mapping(&mut self, generated_line: u32, generated_column: u32, line: u32, column: u32) {
        self.segments.push(Segment {
            generated_line,
            generated_column,
            origin: Some(Origin {
                source: 0,
                line,
                column,
                name: None,
            }),
        });
    }

    pub fn add_unmapped(&mut self, generated_line: u32, generated_column: u32) {
        self.segments.push(Segment {
            generated_line,
            generated_column,
            origin: None,
        });
    }

    pub fn build(self) -> SourceMap {
        SourceMap {
            version: 3,
            file: self.file,
            source_root: None,
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings: encode_mappings(&self.segments),
        }
    }
}

/// Byte offsets of every line start, used to turn offsets into positions.
struct LineIndex<'s> {
    text: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(text: &'s str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, starts }
    }

    /// 0-based line and UTF-16 column.
    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.starts[line];
        let column = self
            .text
            .get(start..offset)
            .map(|s| s.encode_utf16().count())
            .unwrap_or(0);
        (line as u32, column as u32)
    }
}

/// Builds the map for text assembled from `chunks` of `source`.
///
/// Copied ranges get a segment at their start and at every line start inside
/// them; synthetic text gets a generated-only segment.
pub fn map_chunks(source: &str, chunks: &[Chunk], file: &str, source_name: &str) -> SourceMap {
    let index = LineIndex::new(source);
    let mut builder = SourceMapBuilder::new(file, source_name);
    builder.set_source_content(source);

    let (mut line, mut column) = (0u32, 0u32);
    for chunk in chunks {
        match chunk {
            Chunk::Original { start, end } => {
                let (start, end) = (*start as usize, *end as usize);
                let text = source.get(start..end).unwrap_or("");
                if text.is_empty() {
                    continue;
                }
                let (orig_line, orig_column) = index.position(start);
                builder.add_mapping(line, column, orig_line, orig_column);
                let mut offset = start;
                for ch in text.chars() {
                    offset += ch.len_utf8();
                    if ch == '\n' {
                        line += 1;
                        column = 0;
                        if offset < end {
                            let (orig_line, orig_column) = index.position(offset);
                            builder.add_mapping(line, 0, orig_line, orig_column);
                        }
                    } else {
                        column += ch.len_utf16() as u32;
                    }
                }
            }
            Chunk::Synthetic(text) => {
                if text.is_empty() {
                    continue;
                }
                builder.add_unmapped(line, column);
                for ch in text.chars() {
                    if ch == '\n' {
                        line += 1;
                        column = 0;
                    } else {
                        column += ch.len_utf16() as u32;
                    }
                }
            }
        }
    }
    builder.build()
}

/// A map in which every output position maps to the same input position.
pub fn identity_map(content: &str, file: &str, source_name: &str) -> SourceMap {
    let chunks = [Chunk::Original {
        start: 0,
        end: content.len() as u32,
    }];
    map_chunks(content, &chunks, file, source_name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPOSITION
// ═══════════════════════════════════════════════════════════════════════════════

fn lookup_in(segments: &[Segment], line: u32, column: u32) -> Option<Origin> {
    let candidate = segments
        .iter()
        .filter(|s| s.generated_line == line && s.generated_column <= column)
        .max_by_key(|s| s.generated_column)?;
    let origin = candidate.origin?;
    Some(Origin {
        column: origin.column + (column - candidate.generated_column),
        ..origin
    })
}

/// Chains `outer` (output -> intermediate) onto `inner` (intermediate -> original).
///
/// Every `inner` segment that falls inside a range `outer` copied from the
/// intermediate text is carried over, so no mapping of `inner` is lost for
/// retained text. Outer segments with no inner counterpart keep pointing at
/// the intermediate source.
pub fn compose(outer: &SourceMap, inner: &SourceMap) -> Result<SourceMap, OptimizerError> {
    let outer_segments = outer.segments()?;
    let inner_segments = inner.segments()?;

    let mut sources = inner.sources.clone();
    let mut sources_content = inner.sources_content.clone();
    let mut intermediate_index: Option<u32> = None;
    let mut composed: Vec<Segment> = Vec::new();

    for (i, segment) in outer_segments.iter().enumerate() {
        let Some(origin) = segment.origin else {
            composed.push(*segment);
            continue;
        };
        let range_end = outer_segments
            .get(i + 1)
            .filter(|next| next.generated_line == segment.generated_line)
            .map(|next| origin.column + next.generated_column.saturating_sub(segment.generated_column));

        match lookup_in(&inner_segments, origin.line, origin.column) {
            Some(mapped) => composed.push(Segment {
                origin: Some(mapped),
                ..*segment
            }),
            None => {
                let index = *intermediate_index.get_or_insert_with(|| {
                    sources.push(outer.sources.get(origin.source as usize).cloned().unwrap_or_default());
                    if !sources_content.is_empty() {
                        sources_content.push(None);
                    }
                    (sources.len() - 1) as u32
                });
                composed.push(Segment {
                    origin: Some(Origin {
                        source: index,
                        name: None,
                        ..origin
                    }),
                    ..*segment
                });
            }
        }

        for carried in inner_segments.iter().filter(|s| {
            s.generated_line == origin.line
                && s.generated_column > origin.column
                && range_end.map_or(true, |end| s.generated_column < end)
        }) {
            composed.push(Segment {
                generated_line: segment.generated_line,
                generated_column: segment.generated_column + (carried.generated_column - origin.column),
                origin: carried.origin,
            });
        }
    }

    composed.sort_by_key(|s| (s.generated_line, s.generated_column));
    composed.dedup_by_key(|s| (s.generated_line, s.generated_column));

    Ok(SourceMap {
        version: 3,
        file: outer.file.clone(),
        source_root: inner.source_root.clone(),
        sources,
        sources_content,
        names: inner.names.clone(),
        mappings: encode_mappings(&composed),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// VLQ
// ═══════════════════════════════════════════════════════════════════════════════

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0x1F) as u8;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0x20;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Encodes segments, which must be sorted by generated position.
pub fn encode_mappings(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut line = 0u32;
    let mut prev_column = 0i64;
    let (mut prev_source, mut prev_line, mut prev_col, mut prev_name) = (0i64, 0i64, 0i64, 0i64);
    let mut first_on_line = true;

    for segment in segments {
        while line < segment.generated_line {
            out.push(';');
            line += 1;
            prev_column = 0;
            first_on_line = true;
        }
        if !first_on_line {
            out.push(',');
        }
        first_on_line = false;

        encode_vlq(&mut out, segment.generated_column as i64 - prev_column);
        prev_column = segment.generated_column as i64;

        if let Some(origin) = segment.origin {
            encode_vlq(&mut out, origin.source as i64 - prev_source);
            encode_vlq(&mut out, origin.line as i64 - prev_line);
            encode_vlq(&mut out, origin.column as i64 - prev_col);
            prev_source = origin.source as i64;
            prev_line = origin.line as i64;
            prev_col = origin.column as i64;
            if let Some(name) = origin.name {
                encode_vlq(&mut out, name as i64 - prev_name);
                prev_name = name as i64;
            }
        }
    }
    out
}

fn decode_error(mappings: &str) -> OptimizerError {
    let preview: String = mappings.chars().take(32).collect();
    OptimizerError::new(
        ERR_SOURCE_MAP,
        &format!("Malformed mappings near '{}'", preview),
        "",
        0,
        0,
    )
}

pub fn decode_mappings(mappings: &str) -> Result<Vec<Segment>, OptimizerError> {
    let mut segments = Vec::new();
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (generated_line, group) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;
        for raw in group.split(',').filter(|s| !s.is_empty()) {
            let mut fields = Vec::with_capacity(5);
            let mut value = 0i64;
            let mut shift = 0;
            for byte in raw.bytes() {
                let digit = BASE64_CHARS
                    .iter()
                    .position(|&c| c == byte)
                    .ok_or_else(|| decode_error(mappings))? as i64;
                // 32-bit values never need more than seven digits.
                if shift > 30 {
                    return Err(decode_error(mappings));
                }
                value += (digit & 0x1F) << shift;
                if digit & 0x20 != 0 {
                    shift += 5;
                    continue;
                }
                let magnitude = value >> 1;
                fields.push(if value & 1 == 1 { -magnitude } else { magnitude });
                value = 0;
                shift = 0;
            }
            if shift != 0 || !matches!(fields.len(), 1 | 4 | 5) {
                return Err(decode_error(mappings));
            }

            let position = |value: i64| u32::try_from(value).map_err(|_| decode_error(mappings));
            generated_column += fields[0];
            let origin = if fields.len() >= 4 {
                source += fields[1];
                line += fields[2];
                column += fields[3];
                let name_index = match fields.get(4) {
                    Some(delta) => {
                        name += delta;
                        Some(position(name)?)
                    }
                    None => None,
                };
                Some(Origin {
                    source: position(source)?,
                    line: position(line)?,
                    column: position(column)?,
                    name: name_index,
                })
            } else {
                None
            };
            segments.push(Segment {
                generated_line: position(generated_line as i64)?,
                generated_column: position(generated_column)?,
                origin,
            });
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq_round_trip_of_known_mapping() {
        let segments = decode_mappings("AAAA,IAAI;AACA").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].generated_column, 4);
        assert_eq!(segments[1].origin.unwrap().column, 4);
        assert_eq!(segments[2].generated_line, 1);
        assert_eq!(segments[2].origin.unwrap().line, 1);
        assert_eq!(encode_mappings(&segments), "AAAA,IAAI;AACA");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_mappings("A*").is_err());
        assert!(decode_mappings("AA").is_err());
    }

    #[test]
    fn test_decode_rejects_overlong_digits() {
        assert!(decode_mappings("gggggggggggggggA").is_err());
    }

    #[test]
    fn test_decode_rejects_negative_positions() {
        // Column delta -1 from the start of the line.
        assert!(decode_mappings("DAAA").is_err());
        // Source line delta -1 on the first segment.
        assert!(decode_mappings("AADA").is_err());
    }

    #[test]
    fn test_identity_map_maps_each_position_to_itself() {
        let content = "var a = 1;\nvar b = 2;\n";
        let map = identity_map(content, "out.js", "in.js");
        assert_eq!(map.sources, vec!["in.js".to_string()]);
        assert_eq!(map.sources_content, vec![Some(content.to_string())]);
        for (line, column) in [(0, 0), (0, 7), (1, 4)] {
            let origin = map.lookup(line, column).unwrap().unwrap();
            assert_eq!((origin.line, origin.column), (line, column));
        }
    }

    #[test]
    fn test_map_chunks_marks_synthetic_text_unmapped() {
        let source = "a();\nb();";
        let chunks = vec![
            Chunk::Synthetic("/*x*/ ".to_string()),
            Chunk::Original { start: 0, end: 9 },
        ];
        let map = map_chunks(source, &chunks, "", "");
        assert_eq!(map.lookup(0, 2).unwrap(), None);
        let origin = map.lookup(0, 6).unwrap().unwrap();
        assert_eq!((origin.line, origin.column), (0, 0));
        let origin = map.lookup(1, 2).unwrap().unwrap();
        assert_eq!((origin.line, origin.column), (1, 2));
    }

    #[test]
    fn test_compose_keeps_inner_mappings_inside_copied_ranges() {
        // inner: intermediate line 0 has segments at columns 0 and 6, both from original line 3.
        let inner = SourceMap {
            version: 3,
            file: "mid.js".to_string(),
            source_root: None,
            sources: vec!["orig.ts".to_string()],
            sources_content: vec![],
            names: vec![],
            mappings: "AAGA,MAAM".to_string(),
        };
        // outer: output line 0 column 2 copies intermediate line 0 from column 0.
        let outer = SourceMap {
            version: 3,
            file: "out.js".to_string(),
            source_root: None,
            sources: vec!["mid.js".to_string()],
            sources_content: vec![],
            names: vec![],
            mappings: "A,EAAA".to_string(),
        };
        let composed = compose(&outer, &inner).unwrap();
        assert_eq!(composed.file, "out.js");
        assert_eq!(composed.sources, vec!["orig.ts".to_string()]);
        let segments = composed.segments().unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].origin, None);
        assert_eq!(segments[2].generated_column, 8);
        let origin = segments[2].origin.unwrap();
        assert_eq!((origin.line, origin.column), (3, 6));
    }

    #[test]
    fn test_compose_falls_back_to_intermediate_source() {
        let inner = SourceMap {
            version: 3,
            file: "mid.js".to_string(),
            source_root: None,
            sources: vec!["orig.ts".to_string()],
            sources_content: vec![],
            names: vec![],
            mappings: ";AAAA".to_string(),
        };
        let outer = identity_map("x;\ny;", "out.js", "mid.js");
        let composed = compose(&outer, &inner).unwrap();
        assert_eq!(composed.sources, vec!["orig.ts".to_string(), "mid.js".to_string()]);
        let segments = composed.segments().unwrap();
        assert_eq!(segments[0].origin.unwrap().source, 1);
        assert_eq!(segments[1].origin.unwrap().source, 0);
    }

    #[test]
    fn test_deserializes_null_file() {
        let map = SourceMap::from_json(r#"{"version":3,"file":null,"sources":["a"],"names":[],"mappings":"AAAA"}"#).unwrap();
        assert_eq!(map.file, "");
    }
}
