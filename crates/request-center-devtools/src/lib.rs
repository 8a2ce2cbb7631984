pub mod discovery;
pub mod error;
pub mod launch;
pub mod projector;
pub mod server;

pub use discovery::{DevtoolsTarget, list_targets};
pub use error::{BrowserLaunchError, DevtoolsServerError};
pub use launch::{BrowserLauncher, CommandBrowserLauncher, open_inspector};
pub use projector::{CdpFrame, Projector};
pub use server::DevtoolsServer;
