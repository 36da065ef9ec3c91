//! HTML email build.
//!
//! Pages are composed from Handlebars layouts and partials, expanded from
//! Inky components into table markup, then (in production) have the compiled
//! stylesheet pruned and inlined into their `style` attributes.

mod composer;
mod css;
mod html;
mod images;
mod inky;
mod inliner;
mod uncss;

pub use composer::{Compose, Composer};
pub use images::OptimizeImages;
pub use inliner::EmailInliner;
pub use uncss::RemoveUnused;
