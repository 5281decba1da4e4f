pub mod cli;
pub mod config;
pub mod content_type;
pub mod exception;
pub mod fs_probe;
pub mod handler;
pub mod html;
pub mod logging;
pub mod matcher;
pub mod param;
pub mod request;
pub mod resolver;
pub mod response;
pub mod server;

pub use config::{HeaderRule, OptionsInput, RuntimeOptions, TrailingSlash};
pub use exception::Exception;
pub use handler::{RequestHandler, RequestMeta};
pub use html::HtmlBuilder;
pub use matcher::PathMatcher;
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use resolver::{FileResolver, Resolution};
pub use response::Response;
pub use server::{RequestLog, Server};
