use anyhow::Result;
use clap::ValueEnum;

use super::http::{HttpAdapter, config::HttpArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportType {
    Http,
}

pub fn handle_http(args: HttpArgs, transport_type: TransportType) -> Result<HttpAdapter> {
    match transport_type {
        TransportType::Http => HttpAdapter::new(args),
    }
}
