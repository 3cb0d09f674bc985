mod connection;
mod workload;

pub use self::{
    connection::ConnectionConfig,
    workload::{KeySpaceConfig, WorkloadConfig},
};
