//! Resolver backends for live streams.
//!
//! A backend takes an opaque stream identifier plus a [`Strategy`] and
//! produces a short-lived upstream URL. Backends know nothing about caching
//! or fallback ordering; that belongs to the caller.

pub mod backend;
pub mod error;
pub mod identity;
pub mod media;
pub mod strategy;
pub mod streamlink;
pub mod ytdlp;

pub use backend::{ResolveRequest, ResolverBackend, validate_stream_url, watch_url};
pub use error::ExtractorError;
pub use identity::{ClientIdentity, IdentityPool};
pub use media::FormatClass;
pub use strategy::{Strategy, default_strategies};
pub use streamlink::StreamlinkBackend;
pub use ytdlp::{DEFAULT_WATCH_URL_TEMPLATE, YtDlpBackend};
