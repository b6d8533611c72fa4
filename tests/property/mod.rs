//! Property-based tests for filename safety and cache accounting

mod cache_refcount;
mod filename_safety;
