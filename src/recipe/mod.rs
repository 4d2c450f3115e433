//! Recipes: versioned obfuscation and layering parameters.
//!
//! A recipe is either derived from `(secret, rotation bucket)` or supplied
//! by the caller. The [`RecipeManager`] owns the bounded cache of derived
//! recipes; custom recipes never enter it.

mod derive;
mod manager;
mod types;

pub use derive::{derive_recipe, version_for_bucket, CHARSETS};
pub use manager::RecipeManager;
pub use types::{Recipe, Segment, SegmentKind, MAX_LAYERS, MIN_LAYERS};
