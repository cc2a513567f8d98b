pub mod config;
pub mod dispatch;
pub mod manager;
pub mod partition;
pub mod restful;
pub mod routes;
pub mod scheduler;
pub mod select;
pub mod transport;
pub mod upstream;
pub mod worker;
