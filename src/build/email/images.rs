//! Lossless image optimization for email assets.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

/// Re-encodes PNG images at maximum compression; other files pass through.
///
/// The re-encoded image only replaces the original when it is smaller.
pub struct OptimizeImages;

fn recompress_png(contents: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory_with_format(contents, ImageFormat::Png)?;
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color().into(),
    )?;
    Ok(out)
}

impl FileStage for OptimizeImages {
    fn name(&self) -> &'static str {
        "optimize-images"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        if !file.has_extension("png") {
            return Ok(());
        }
        let optimized =
            recompress_png(&file.contents).map_err(|e| PipelineError::syntax(&file.origin, e))?;
        if optimized.len() < file.contents.len() {
            file.contents = optimized;
        }
        Ok(())
    }
}
