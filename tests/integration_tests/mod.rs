// Integration suites, one file per area.
mod _support;
mod cli;
mod config;
mod cursor;
mod query;
mod storage;
mod telemetry;
mod write;
