//! Files written next to the extraction store.
//!
//! ```text
//! data_dir/
//! ├── articles/2026-02-25.jsonl             # extracted documents (store)
//! ├── extracted-urls.json                  # seen-URL cache
//! └── scrape-2026-02-25T04-05-06-000Z.json # raw scrape snapshot
//! ```

pub mod json;
