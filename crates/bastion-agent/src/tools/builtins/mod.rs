mod docker;
mod list_servers;
mod local_command;
mod metrics;
mod read_file;
mod remote_command;
mod server_status;
mod service;
mod target;

pub use docker::{DockerLogsTool, DockerPsTool};
pub use list_servers::ListServersTool;
pub use local_command::LocalCommandTool;
pub use metrics::QueryMetricsTool;
pub use read_file::ReadFileTool;
pub use remote_command::RemoteCommandTool;
pub use server_status::ServerStatusTool;
pub use service::{ServiceJournalTool, ServiceStatusTool};
