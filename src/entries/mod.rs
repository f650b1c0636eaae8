pub mod entry;
pub mod enumerator;

pub use entry::Entry;
pub use enumerator::EntryEnumerator;
