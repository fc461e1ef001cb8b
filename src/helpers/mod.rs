//! Resolver and inference helpers used by the builders and by queries.
//!
//! - `helpers` resolves names, iterable contents and called functions
//! - `imports` maps module names to documents
//! - `search_paths` gathers the directories modules are searched in
//! - `documentation` loads the builtin documentation module

pub mod documentation;
pub mod helpers;
pub mod imports;
pub mod search_paths;
