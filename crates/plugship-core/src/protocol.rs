//! JSON bodies exchanged between the server and update clients.

use serde::{Deserialize, Serialize};

use crate::catalog::PluginDescriptor;

/// Body of `GET /list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub plugins: Vec<PluginDescriptor>,
}

/// Body of `POST /update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub download_list: Vec<String>,
}

/// Body returned alongside any non-2xx status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
