mod error;
pub mod handlers;
mod http_server;
mod listener;
pub mod response_body;
pub mod router;
mod server_context;

pub use error::Error;
pub use http_server::serve_connection;
pub use listener::{Listener, Timeouts};
pub use response_body::ResponseBody;
pub use server_context::ServerContext;
