//! HTTP status API for the rendering layer.

mod server;

pub use server::{
    StatusServer, SummaryResponse, HEALTH_ROUTE, REFRESH_ROUTE, SERVICES_ROUTE, SUMMARY_ROUTE,
};
