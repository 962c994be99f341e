pub mod access_log;
pub mod cache;
pub mod config;
pub mod error_page;
pub mod exception;
pub mod filter;
pub mod param;
pub mod pipeline;
pub mod reader;
pub mod request;
pub mod resolver;
pub mod response;
pub mod server;
pub mod util;

pub use access_log::{AccessLogBuffer, FlushWorker, LogEntry};
pub use cache::FileCache;
pub use config::Config;
pub use error_page::ErrorResponder;
pub use exception::Exception;
pub use filter::RequestFilter;
pub use param::{HttpRequestMethod, HttpVersion};
pub use pipeline::{Context, Next, Pipeline, Stage};
pub use reader::{DiskReader, FileReader};
pub use request::Request;
pub use resolver::PathResolver;
pub use response::Response;
pub use server::App;
