//! Version 3 source maps with line-level mappings.
//!
//! Mappings are coarse: an untouched file maps every generated line to the
//! same source line, a compiled file maps every generated line to the start
//! of its source. That is enough for devtools to show which source file a rule
//! or statement came from.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

/// Segment for a line mapped to the start of the same source line as the
/// previous one (all deltas zero).
const SAME_LINE: &str = "AAAA";
/// Segment for a line mapped to the next source line (source line delta +1).
const NEXT_LINE: &str = "AACA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Map each line of `content` onto itself.
    pub fn identity(file: impl Into<String>, source: impl Into<String>, content: &str) -> Self {
        let lines = content.lines().count().max(1);
        let mut segments = Vec::with_capacity(lines);
        segments.push(SAME_LINE);
        segments.extend(std::iter::repeat_n(NEXT_LINE, lines - 1));

        Self {
            version: 3,
            file: file.into(),
            sources: vec![source.into()],
            sources_content: vec![content.to_string()],
            names: Vec::new(),
            mappings: segments.join(";"),
        }
    }

    /// Replace the mappings after a compile step produced `generated_lines`
    /// lines: every one of them points at the start of the source.
    pub fn collapse(&mut self, generated_lines: usize) {
        self.mappings = vec![SAME_LINE; generated_lines.max(1)].join(";");
    }

    /// Account for `lines` unmapped lines inserted at the top of the file.
    pub fn shift(&mut self, lines: usize) {
        self.mappings.insert_str(0, &";".repeat(lines));
    }

    /// Serialize as a base64 `data:` URI.
    pub fn to_data_uri(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(json)
        )
    }

    /// The reference comment to append to a file of the given extension.
    pub fn comment(&self, extension: Option<&str>) -> String {
        match extension {
            Some("js") => format!("//# sourceMappingURL={}", self.to_data_uri()),
            _ => format!("/*# sourceMappingURL={} */", self.to_data_uri()),
        }
    }
}
