pub mod app;
pub mod archive;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod samplesheet;
pub mod splitter;
pub mod transfer;
