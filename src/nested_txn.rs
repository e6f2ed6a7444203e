//! Nested (child) write transaction tests.
//!
//! The actual implementation lives on `Transaction<'env, Write>` itself
//! (`begin_nested` / `commit_nested` in `txn.rs`) rather than behind a
//! separate wrapper type: a child transaction is just another
//! `Transaction<'env, Write>`, so every existing `Database`/`Cursor`/`BTree`
//! call site works on it unmodified. This module only exercises that API.
