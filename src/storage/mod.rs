//! Storage implementations for different backends

pub mod in_memory;
pub mod supabase;

pub use in_memory::InMemoryStore;
pub use supabase::SupabaseStore;
