//! The declaration/use chain.
//!
//! Every analysed document owns a [`duchain::TopDUContext`]: a tree of
//! lexical contexts (module, class, function, other), the declarations made
//! in them and the uses resolved to them. The [`duchain::DUChain`] store
//! keeps the top contexts of all documents and is shared behind a
//! reader/writer lock.
//!
//! - `context` describes contexts and uses
//! - `declaration` describes declarations and their stable ids
//! - `lookup` finds declarations through scopes, imports and base classes

pub mod context;
pub mod declaration;
pub mod duchain;
pub mod lookup;

#[cfg(test)]
mod tests;
