//! Link code storage adapters.

mod file_store;

pub use file_store::FileLinkCodeStore;
