//! asset-harvester - crawl a free asset catalog, download the packs and
//! flatten them into a type-partitioned tree of images.

pub mod archive;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod download;
pub mod hash;
pub mod paths;
pub mod unfold;
