//! License header annotation.

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

/// Prepends a fixed header (normally the license banner) to every record.
pub struct Header {
    text: String,
}

impl Header {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl FileStage for Header {
    fn name(&self) -> &'static str {
        "header"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        if self.text.is_empty() {
            return Ok(());
        }
        let mut contents = Vec::with_capacity(self.text.len() + file.contents.len());
        contents.extend_from_slice(self.text.as_bytes());
        contents.append(&mut file.contents);
        file.contents = contents;

        if let Some(map) = file.source_map.as_mut() {
            map.shift(self.text.matches('\n').count());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::build::pipeline::SourceMap;

    #[test]
    fn test_header_prepended_and_map_shifted() {
        let header = Header::new("/* MIT */\n");
        let ctx = PipelineContext::new("t", BuildMode::Development);
        let mut file = FileRecord::new("a.css", "/a.css", b".a{}".to_vec());
        file.source_map = Some(SourceMap::identity("a.css", "a.css", ".a{}"));

        header.transform(&mut file, &ctx).unwrap();

        assert_eq!(file.text().unwrap(), "/* MIT */\n.a{}");
        assert_eq!(file.source_map.unwrap().mappings, ";AAAA");
    }

    #[test]
    fn test_empty_header_is_noop() {
        let header = Header::new("");
        let ctx = PipelineContext::new("t", BuildMode::Production);
        let mut file = FileRecord::new("a.js", "/a.js", b"x()".to_vec());
        header.transform(&mut file, &ctx).unwrap();
        assert_eq!(file.contents, b"x()");
    }
}
