pub mod common;
mod compaction_tests;
mod store_tests;
