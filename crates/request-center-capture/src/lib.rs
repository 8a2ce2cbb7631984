pub mod body;
pub mod client;
pub mod error;
pub mod fetch;
pub mod sink;
pub mod state;

pub use client::InterceptedClient;
pub use fetch::{FetchRequest, FetchResponse};
pub use sink::{ChannelSink, RecordSink};
pub use state::{install, install_fetch, uninstall, uninstall_fetch};
