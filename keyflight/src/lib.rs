//! Per-key request coalescing ("singleflight") for expensive async lookups.
//!
//! A [`Registry`] makes sure that concurrent callers asking for the same key
//! share a single invocation of the supplied fetch function. Nothing is kept
//! once the fetch completes: the next call for that key fetches again.
//!
//! ```no_run
//! # async fn example() {
//! use keyflight::Registry;
//!
//! let registry = Registry::<u64, String, std::io::Error>::new();
//! let a = registry.resolve(7, |key| async move { Ok(format!("user-{key}")) });
//! // Joins the fetch started above instead of starting a second one.
//! let b = registry.resolve(7, |key| async move { Ok(format!("user-{key}")) });
//! assert_eq!(a.await.unwrap(), b.await.unwrap());
//! # }
//! ```
mod error;
pub mod registry;
pub mod resolver;

pub use self::error::{Error, Result};
pub use self::registry::{Registry, RegistryConfig};
