//! General-purpose pipeline stages.
//!
//! Domain stages (SCSS, bundling, email) live next to their subsystems; these
//! are the building blocks every task shares:
//!
//! 1. **Cached** - Drop records unchanged since the last write
//! 2. **When** - Apply a per-file stage to matching paths only
//! 3. **Header** - Prepend the license banner
//! 4. **SourceMapInit / SourceMapWrite** - Start and embed source maps
//! 5. **Concat** - Join records into one bundle

mod cached;
mod concat;
mod header;
mod maps;
mod when;

pub use cached::Cached;
pub use concat::Concat;
pub use header::Header;
pub use maps::{SourceMapInit, SourceMapWrite};
pub use when::When;
