mod trie;
mod trie_store;

pub use trie::Trie;
pub use trie_store::{TrieStore, ValueGuard};
