//! Line-level source maps.
//!
//! Maps are tracked per generated line. Steps that keep the line structure
//! (concatenation) preserve exact line mappings; steps that rewrite a file
//! wholesale (compilers, prefixers) collapse the map to file granularity, so
//! every generated line still points at the right source file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::file::{slash_path, FileEntry};
use crate::transform::{line_count, Outcome, Transform};

const BASE64_DIGITS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    source: u32,
    line: u32,
}

/// A source map with one optional mapping per generated line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    sources: Vec<String>,
    contents: Vec<String>,
    lines: Vec<Option<Mapping>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    sources_content: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    /// Map where generated line `n` is line `n` of `source`.
    pub fn identity(source: &str, content: &str) -> Self {
        let lines = (0..line_count(content.as_bytes()))
            .map(|line| {
                Some(Mapping {
                    source: 0,
                    line: line as u32,
                })
            })
            .collect();

        Self {
            sources: vec![source.to_string()],
            contents: vec![content.to_string()],
            lines,
        }
    }

    /// Source file names.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of generated lines covered.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Source file and line for a generated line (both 0-based).
    pub fn lookup(&self, generated_line: usize) -> Option<(&str, usize)> {
        let mapping = self.lines.get(generated_line).copied().flatten()?;
        Some((
            self.sources[mapping.source as usize].as_str(),
            mapping.line as usize,
        ))
    }

    /// Re-point the map after a step rewrote the file into `generated`.
    ///
    /// Line correspondence is lost, so every generated line maps to the
    /// first line of the source the map started from.
    pub fn collapse(&mut self, generated: &str) {
        let Some(first) = self.lines.iter().flatten().next().copied() else {
            self.lines = vec![None; line_count(generated.as_bytes())];
            return;
        };

        let target = Mapping {
            source: first.source,
            line: 0,
        };
        self.lines = vec![Some(target); line_count(generated.as_bytes())];
    }

    /// Merge the maps of concatenated parts. Each part is given as its line
    /// count and optional map; parts without a map stay unmapped.
    pub fn concat(parts: Vec<(usize, Option<SourceMap>)>) -> Self {
        let mut merged = SourceMap::default();

        for (lines, map) in parts {
            let Some(map) = map else {
                merged.lines.extend(std::iter::repeat(None).take(lines));
                continue;
            };

            let remap: Vec<u32> = map
                .sources
                .iter()
                .zip(&map.contents)
                .map(|(source, content)| merged.source_index(source, content))
                .collect();

            for line in 0..lines {
                let mapping = map.lines.get(line).copied().flatten().map(|m| Mapping {
                    source: remap[m.source as usize],
                    line: m.line,
                });
                merged.lines.push(mapping);
            }
        }

        merged
    }

    fn source_index(&mut self, source: &str, content: &str) -> u32 {
        if let Some(i) = self.sources.iter().position(|s| s == source) {
            return i as u32;
        }
        self.sources.push(source.to_string());
        self.contents.push(content.to_string());
        (self.sources.len() - 1) as u32
    }

    /// The `mappings` field: one segment per mapped line, all at column 0.
    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut previous = Mapping { source: 0, line: 0 };

        for (i, mapping) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            if let Some(mapping) = mapping {
                encode_vlq(0, &mut out);
                encode_vlq(i64::from(mapping.source) - i64::from(previous.source), &mut out);
                encode_vlq(i64::from(mapping.line) - i64::from(previous.line), &mut out);
                encode_vlq(0, &mut out);
                previous = *mapping;
            }
        }

        out
    }

    /// Source map v3 JSON for the generated file `file`.
    pub fn to_json(&self, file: &str) -> String {
        let raw = RawSourceMap {
            version: 3,
            file,
            sources: &self.sources,
            sources_content: &self.contents,
            names: [],
            mappings: self.mappings(),
        };
        // Serializing strings and integers cannot fail.
        serde_json::to_string(&raw).unwrap_or_default()
    }

    /// `data:` URL embedding the map.
    pub fn to_data_url(&self, file: &str) -> String {
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json(file))
        )
    }
}

/// Base64 VLQ encoding as used by source map v3.
fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64_DIGITS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Starts tracking a source map for every file that has none yet.
pub struct InitSourceMaps;

impl Transform for InitSourceMaps {
    fn name(&self) -> &str {
        "sourcemaps-init"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |mut file| {
            if file.source_map.is_none() {
                let map = SourceMap::identity(&slash_path(&file.source), file.text(self.name())?);
                file.source_map = Some(map);
            }
            Ok(file)
        })
    }
}

/// Embeds each file's source map as an inline comment and stops tracking it.
pub struct WriteSourceMaps;

impl Transform for WriteSourceMaps {
    fn name(&self) -> &str {
        "sourcemaps-write"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |mut file| {
            let Some(map) = file.source_map.take() else {
                return Ok(file);
            };

            let file_name = file
                .relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let url = map.to_data_url(&file_name);
            let comment = match file.extension() {
                Some("css") => format!("/*# sourceMappingURL={} */\n", url),
                _ => format!("//# sourceMappingURL={}\n", url),
            };

            if !file.contents.is_empty() && !file.contents.ends_with(b"\n") {
                file.contents.push(b'\n');
            }
            file.contents.extend_from_slice(comment.as_bytes());
            Ok(file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Concat;
    use pretty_assertions::assert_eq;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn encodes_vlq_values() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn identity_map_walks_lines() {
        let map = SourceMap::identity("a.js", "one\ntwo\nthree\n");

        assert_eq!(map.mappings(), "AAAA;AACA;AACA");
        assert_eq!(map.lookup(2), Some(("a.js", 2)));
    }

    #[test]
    fn concatenated_maps_point_back_to_each_source() {
        let mut a = FileEntry::new("lib/a.js", "a.js", "var a = 1;\nvar b = 2;");
        a.source_map = Some(SourceMap::identity("lib/a.js", "var a = 1;\nvar b = 2;"));
        let mut b = FileEntry::new("lib/b.js", "b.js", "var c = 3;\n");
        b.source_map = Some(SourceMap::identity("lib/b.js", "var c = 3;\n"));

        let out = Concat::new("vendor.js").apply(vec![a, b]);
        let map = out.files[0].source_map.as_ref().unwrap();

        assert_eq!(map.sources(), &["lib/a.js".to_string(), "lib/b.js".to_string()]);
        assert_eq!(map.lookup(1), Some(("lib/a.js", 1)));
        assert_eq!(map.lookup(2), Some(("lib/b.js", 0)));
        assert_eq!(map.mappings(), "AAAA;AACA;ACDA");
    }

    #[test]
    fn collapse_maps_every_line_to_file_start() {
        let mut map = SourceMap::identity("main.scss", "$c: red;\n.a { color: $c; }\n");

        map.collapse(".a {\n  color: red;\n}\n");

        assert_eq!(map.line_count(), 3);
        assert_eq!(map.lookup(2), Some(("main.scss", 0)));
    }

    #[test]
    fn json_contains_sources_and_content() {
        let map = SourceMap::identity("a.css", ".a{}");
        let json: serde_json::Value = serde_json::from_str(&map.to_json("out.css")).unwrap();

        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "out.css");
        assert_eq!(json["sources"][0], "a.css");
        assert_eq!(json["sourcesContent"][0], ".a{}");
        assert_eq!(json["mappings"], "AAAA");
    }

    #[test]
    fn writes_inline_comment_by_file_type() {
        let css = FileEntry::new("a.scss", "a.css", ".a{}");
        let js = FileEntry::new("a.js", "a.js", "var a;\n");
        let out = WriteSourceMaps.apply(InitSourceMaps.apply(vec![css, js]).files);

        let css = String::from_utf8(out.files[0].contents.clone()).unwrap();
        let js = String::from_utf8(out.files[1].contents.clone()).unwrap();

        assert!(css.starts_with(".a{}\n/*# sourceMappingURL=data:application/json"));
        assert!(css.trim_end().ends_with("*/"));
        assert!(js.starts_with("var a;\n//# sourceMappingURL=data:application/json"));
        assert!(out.files.iter().all(|f| f.source_map.is_none()));
    }
}
