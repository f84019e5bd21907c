//! sitegen headless-CMS infrastructure adapter.
//!
//! Implements [`pipeline::CmsClient`] over the Sanity HTTP API: GROQ queries
//! through `data/query` and document writes through `data/mutate`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** No domain decisions are made here; the publisher, init
//! and page-generator stages decide what to write.

mod sanity;

pub use sanity::{Mutation, SanityClient};
