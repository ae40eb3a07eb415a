mod store;

pub use store::{select_canonical, SymbolConfigStore};

#[cfg(test)]
mod tests;
