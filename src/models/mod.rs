// Domain models shared by the core and the HTTP adapter

mod command;
mod health;
mod log;
mod sample;
mod status;

pub use command::CommandResult;
pub use health::{
    CpuUsage, CpuWindows, DiskUsage, HealthReport, HealthSource, MemoryUsage, MsptStats,
    TPS_SENTINEL, TpsWindows, non_negative_or,
};
pub use log::{LogEvent, LogLine};
pub use sample::{PlayerList, ServerSample};
pub use status::{ConnectionStatus, StatusEvent};
