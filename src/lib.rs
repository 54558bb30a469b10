#![forbid(unsafe_code)]

pub mod cli;
pub mod crawl;
pub mod document;
pub mod fetch;
pub mod formats;
pub mod images;
pub mod links;
pub mod logging;
pub mod markdown;
pub mod output;
pub mod slug;
