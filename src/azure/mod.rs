//! @acp:module "Azure"
//! @acp:summary "Credential acquisition and Resource Manager queries"
//! @acp:domain azure
//! @acp:layer infrastructure

pub mod credential;
pub mod resources;

pub use credential::DefaultAzureCredential;
pub use resources::{ResourceManagementClient, ResourceQuery};
